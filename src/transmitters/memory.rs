//! In-memory transmitter for dry runs and tests

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::transmitter::Transmitter;
use crate::types::decode_frame;
use crate::{ConductorError, Result};

/// One payload captured by a [`MemoryTransmitter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayload {
    pub universe: u16,
    pub data: Vec<u8>,
}

impl SentPayload {
    /// Frame counter carried by this payload
    pub fn frame(&self) -> Option<u16> {
        decode_frame(&self.data)
    }
}

#[derive(Debug, Default)]
struct Log {
    sent: Vec<SentPayload>,
    initialized: bool,
    initialize_calls: usize,
    shutdown_calls: usize,
}

/// Transmitter that records payloads instead of putting them on the wire
///
/// Clones share the same log, so a test can keep one handle while the engine
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransmitter {
    log: Arc<Mutex<Log>>,
}

impl MemoryTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<SentPayload> {
        self.log().sent.clone()
    }

    /// Frame counters sent so far, in order
    pub fn frames(&self) -> Vec<u16> {
        self.log().sent.iter().filter_map(SentPayload::frame).collect()
    }

    /// Most recent payload, if any
    pub fn last(&self) -> Option<SentPayload> {
        self.log().sent.last().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.log().initialized
    }

    pub fn initialize_calls(&self) -> usize {
        self.log().initialize_calls
    }

    pub fn shutdown_calls(&self) -> usize {
        self.log().shutdown_calls
    }

    /// Forget recorded payloads
    pub fn clear(&self) {
        self.log().sent.clear();
    }
}

#[async_trait::async_trait]
impl Transmitter for MemoryTransmitter {
    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&mut self) -> Result<()> {
        let mut log = self.log();
        log.initialized = true;
        log.initialize_calls += 1;
        Ok(())
    }

    async fn send(&mut self, universe: u16, payload: &[u8]) -> Result<()> {
        let mut log = self.log();
        if !log.initialized {
            return Err(ConductorError::transmit(universe, "memory transmitter not initialized"));
        }
        trace!(universe, len = payload.len(), "Recorded payload");
        log.sent.push(SentPayload { universe, data: payload.to_vec() });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let mut log = self.log();
        log.initialized = false;
        log.shutdown_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_frame;

    #[tokio::test]
    async fn records_only_while_initialized() {
        let mut transmitter = MemoryTransmitter::new();
        let handle = transmitter.clone();

        assert!(transmitter.send(1, &encode_frame(5, 24)).await.is_err());

        transmitter.initialize().await.unwrap();
        transmitter.send(7, &encode_frame(5, 24)).await.unwrap();
        transmitter.send(7, &encode_frame(6, 24)).await.unwrap();
        transmitter.shutdown().await.unwrap();

        assert_eq!(handle.frames(), vec![5, 6]);
        assert_eq!(handle.last().map(|p| p.universe), Some(7));
        assert_eq!(handle.initialize_calls(), 1);
        assert_eq!(handle.shutdown_calls(), 1);
        assert!(!handle.is_initialized());
    }
}
