//! Test utilities: misbehaving transmitters and logging setup
//!
//! These helpers are shared by unit tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, Ordering};

use crate::transmitter::Transmitter;
use crate::{ConductorError, Result};

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Transmitter that fails on selected operations
#[derive(Debug, Clone, Default)]
pub struct FailingTransmitter {
    fail_initialize: bool,
    fail_send: bool,
    fail_shutdown: bool,
}

impl FailingTransmitter {
    /// Output resource can never be acquired
    pub fn failing_initialize() -> Self {
        Self { fail_initialize: true, ..Self::default() }
    }

    /// Initializes fine but every send fails
    pub fn failing_send() -> Self {
        Self { fail_send: true, ..Self::default() }
    }

    /// Sends fine but releasing the resource fails
    pub fn failing_shutdown() -> Self {
        Self { fail_shutdown: true, ..Self::default() }
    }
}

#[async_trait::async_trait]
impl Transmitter for FailingTransmitter {
    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.fail_initialize {
            return Err(ConductorError::unavailable("simulated driver failure"));
        }
        Ok(())
    }

    async fn send(&mut self, universe: u16, _payload: &[u8]) -> Result<()> {
        if self.fail_send {
            return Err(ConductorError::transmit(universe, "simulated send failure"));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.fail_shutdown {
            return Err(ConductorError::transmit(0, "simulated release failure"));
        }
        Ok(())
    }
}

/// Distinct loopback address per call (`127.0.0.2`, `127.0.0.3`, ...).
///
/// Coordinators filter their own datagrams by source IP, so peers in one test
/// process need different addresses. Linux routes all of `127.0.0.0/8` to
/// loopback.
pub fn next_loopback_ip() -> IpAddr {
    static NEXT: AtomicU16 = AtomicU16::new(2);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let [hi, lo] = n.to_be_bytes();
    IpAddr::V4(Ipv4Addr::new(127, 0, hi, lo))
}

/// Unused UDP port on loopback, as reported by the OS.
pub fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .and_then(|socket| socket.local_addr())
        .map(|addr| addr.port())
        .unwrap_or(49_152)
}
