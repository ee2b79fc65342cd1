//! Transmitter standing in for a missing output library

use crate::transmitter::Transmitter;
use crate::{ConductorError, Result};

/// Transmitter whose backing library is not installed
///
/// Every start attempt fails with
/// [`ConductorError::TransmitterUnavailable`], leaving the engine stopped.
#[derive(Debug, Clone)]
pub struct UnavailableTransmitter {
    reason: String,
}

impl UnavailableTransmitter {
    /// Create a transmitter that reports `reason` on every initialize
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Default for UnavailableTransmitter {
    fn default() -> Self {
        Self::new("no output library available")
    }
}

#[async_trait::async_trait]
impl Transmitter for UnavailableTransmitter {
    fn is_available(&self) -> bool {
        false
    }

    async fn initialize(&mut self) -> Result<()> {
        Err(ConductorError::unavailable(self.reason.clone()))
    }

    async fn send(&mut self, universe: u16, _payload: &[u8]) -> Result<()> {
        Err(ConductorError::transmit(universe, self.reason.clone()))
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
