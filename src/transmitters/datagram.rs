//! Raw datagram transmitter (debug output)
//!
//! Sends each payload as a bare UDP datagram to the universe's multicast group
//! (`239.255.{hi}.{lo}:5568`, the addressing scheme sACN receivers listen on).
//! No E1.31 layers are added, so real sACN receivers drop these packets. Use
//! it to inspect payloads with a plain UDP listener; use
//! [`SacnTransmitter`](super::SacnTransmitter) for actual output.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::transmitter::Transmitter;
use crate::{ConductorError, Result};

/// Port sACN receivers listen on
pub const SACN_PORT: u16 = 5568;

/// Multicast group for a universe
pub fn universe_multicast_addr(universe: u16) -> SocketAddr {
    let [hi, lo] = universe.to_be_bytes();
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, hi, lo)), SACN_PORT)
}

/// Transmitter writing payloads to UDP
pub struct DatagramTransmitter {
    bind_addr: SocketAddr,
    destination: Option<SocketAddr>,
    multicast_ttl: u32,
    socket: Option<UdpSocket>,
}

impl DatagramTransmitter {
    /// Transmitter sending to per-universe multicast groups
    pub fn new() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            destination: None,
            multicast_ttl: 1,
            socket: None,
        }
    }

    /// Send every universe to one fixed address instead (unicast output)
    pub fn with_destination(mut self, destination: SocketAddr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Bind the output socket to a specific local address
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    fn target(&self, universe: u16) -> SocketAddr {
        self.destination.unwrap_or_else(|| universe_multicast_addr(universe))
    }
}

impl Default for DatagramTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transmitter for DatagramTransmitter {
    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&mut self) -> Result<()> {
        let socket = UdpSocket::bind(self.bind_addr).await.map_err(|e| {
            ConductorError::unavailable_with_source(
                format!("cannot bind output socket on {}", self.bind_addr),
                Box::new(e),
            )
        })?;
        socket
            .set_multicast_ttl_v4(self.multicast_ttl)
            .map_err(|e| ConductorError::network("set multicast ttl", e))?;

        info!(
            local_addr = ?socket.local_addr().ok(),
            destination = ?self.destination,
            "Datagram output ready"
        );
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, universe: u16, payload: &[u8]) -> Result<()> {
        let target = self.target(universe);
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ConductorError::transmit(universe, "output socket not initialized"))?;

        socket.send_to(payload, target).await.map_err(|e| ConductorError::transmit(universe, e))?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("Datagram output closed");
        }
        Ok(())
    }
}
