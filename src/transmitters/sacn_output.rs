//! sACN (E1.31) transmitter
//!
//! Wraps [`sacn::source::SacnSource`], which builds the root, framing and DMP
//! layers. Payloads go to the universe's multicast group unless a unicast
//! destination is set. Universes are registered on first use, so a live
//! universe change needs no restart.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use sacn::source::SacnSource;
use tracing::{debug, info, warn};

use crate::transmitter::Transmitter;
use crate::transmitters::datagram::SACN_PORT;
use crate::{ConductorError, Result};

/// Source name announced in every packet
pub const DEFAULT_SOURCE_NAME: &str = "Frame Conductor";

/// Priority for every universe (E1.31 default)
pub const DEFAULT_PRIORITY: u8 = 100;

/// DMX512 null start code, prepended to each payload
const NULL_START_CODE: u8 = 0x00;

/// Transmitter emitting E1.31 data packets
pub struct SacnTransmitter {
    source_name: String,
    bind_addr: SocketAddr,
    destination: Option<SocketAddr>,
    priority: u8,
    source: Option<SacnSource>,
    registered: BTreeSet<u16>,
    packet: Vec<u8>,
}

impl SacnTransmitter {
    /// Multicast output bound on every interface
    pub fn new() -> Self {
        Self {
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), SACN_PORT + 1),
            destination: None,
            priority: DEFAULT_PRIORITY,
            source: None,
            registered: BTreeSet::new(),
            packet: Vec::new(),
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Send every universe to one receiver instead of its multicast group
    pub fn with_destination(mut self, destination: SocketAddr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Local address of the output socket
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn registered_universes(&self) -> impl Iterator<Item = u16> + '_ {
        self.registered.iter().copied()
    }
}

impl Default for SacnTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transmitter for SacnTransmitter {
    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&mut self) -> Result<()> {
        let source = SacnSource::with_ip(&self.source_name, self.bind_addr).map_err(|e| {
            ConductorError::unavailable(format!(
                "cannot create sACN source on {}: {}",
                self.bind_addr, e
            ))
        })?;

        info!(bind = %self.bind_addr, destination = ?self.destination, "sACN output ready");
        self.source = Some(source);
        self.registered.clear();
        Ok(())
    }

    async fn send(&mut self, universe: u16, payload: &[u8]) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| ConductorError::transmit(universe, "sACN source not initialized"))?;

        if !self.registered.contains(&universe) {
            source
                .register_universe(universe)
                .map_err(|e| ConductorError::transmit(universe, e.to_string()))?;
            self.registered.insert(universe);
            debug!("Registered universe {}", universe);
        }

        self.packet.clear();
        self.packet.push(NULL_START_CODE);
        self.packet.extend_from_slice(payload);

        source
            .send(&[universe], &self.packet, Some(self.priority), self.destination, None)
            .map_err(|e| ConductorError::transmit(universe, e.to_string()))
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(mut source) = self.source.take() else {
            return Ok(());
        };

        for universe in std::mem::take(&mut self.registered) {
            if let Err(e) = source.terminate_stream(universe, NULL_START_CODE) {
                warn!("Failed to terminate universe {}: {}", universe, e);
            }
        }
        debug!("sACN output closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_frame;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    /// Root layer ACN packet identifier
    const ACN_IDENTIFIER: &[u8; 12] = b"ASC-E1.17\0\0\0";

    #[tokio::test]
    async fn send_requires_initialize() {
        let mut transmitter = SacnTransmitter::new();
        assert!(transmitter.is_available());
        assert!(transmitter.send(1, &[0, 1]).await.is_err());
        // Nothing to release yet
        assert!(transmitter.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn packets_carry_e131_framing_and_the_payload() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transmitter = SacnTransmitter::new()
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .with_destination(receiver.local_addr().unwrap());

        transmitter.initialize().await.unwrap();
        let payload = encode_frame(0x1234, 24);
        transmitter.send(999, &payload).await.unwrap();
        assert_eq!(transmitter.registered_universes().collect::<Vec<_>>(), vec![999]);

        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
            .await
            .expect("sACN packet should arrive")
            .unwrap();
        let packet = &buf[..len];

        assert_eq!(&packet[4..16], ACN_IDENTIFIER);
        // Start code then the payload close the DMP layer
        assert_eq!(&packet[len - payload.len()..], payload.as_slice());
        assert_eq!(packet[len - payload.len() - 1], NULL_START_CODE);

        transmitter.shutdown().await.unwrap();
        assert!(transmitter.send(999, &payload).await.is_err());
    }
}
