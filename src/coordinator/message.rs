//! Peer messages exchanged on the singleton channel
//!
//! Each datagram carries one UTF-8 JSON object:
//!
//! ```json
//! {"type": "instance_check", "instance_id": "192.168.1.20:9000:5173", "timestamp": 1718035200.25}
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Largest datagram the coordinator reads.
pub const MAX_DATAGRAM: usize = 1024;

/// Message discriminator, serialized as the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerMessageKind {
    /// "Is anyone already active?" broadcast at startup
    InstanceCheck,
    /// Unicast reply from an active instance
    InstanceResponse,
    /// Periodic presence broadcast from an active instance
    Heartbeat,
}

/// One datagram on the singleton channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMessage {
    #[serde(rename = "type")]
    pub kind: PeerMessageKind,
    #[serde(default = "unknown_instance")]
    pub instance_id: String,
    /// Seconds since the Unix epoch
    #[serde(default)]
    pub timestamp: f64,
}

fn unknown_instance() -> String {
    "unknown".to_string()
}

impl PeerMessage {
    /// Message of `kind` from `instance_id`, stamped now
    pub fn new(kind: PeerMessageKind, instance_id: impl Into<String>) -> Self {
        Self { kind, instance_id: instance_id.into(), timestamp: unix_timestamp() }
    }

    pub fn instance_check(instance_id: impl Into<String>) -> Self {
        Self::new(PeerMessageKind::InstanceCheck, instance_id)
    }

    pub fn instance_response(instance_id: impl Into<String>) -> Self {
        Self::new(PeerMessageKind::InstanceResponse, instance_id)
    }

    pub fn heartbeat(instance_id: impl Into<String>) -> Self {
        Self::new(PeerMessageKind::Heartbeat, instance_id)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(datagram: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(datagram)?)
    }
}

/// Current time as floating-point seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_snake_case_type_tag() {
        let message = PeerMessage {
            kind: PeerMessageKind::InstanceCheck,
            instance_id: "10.0.0.5:9000:5173".to_string(),
            timestamp: 1.5,
        };
        let json: serde_json::Value = serde_json::from_slice(&message.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "instance_check");
        assert_eq!(json["instance_id"], "10.0.0.5:9000:5173");
        assert_eq!(json["timestamp"], 1.5);
    }

    #[test]
    fn decodes_messages_from_other_implementations() {
        let raw = br#"{"type": "instance_response", "instance_id": "peer", "timestamp": 1718035200.25}"#;
        let message = PeerMessage::decode(raw).unwrap();
        assert_eq!(message.kind, PeerMessageKind::InstanceResponse);
        assert_eq!(message.instance_id, "peer");

        let sparse = PeerMessage::decode(br#"{"type": "heartbeat"}"#).unwrap();
        assert_eq!(sparse.instance_id, "unknown");
    }

    #[test]
    fn rejects_garbage_and_unknown_types() {
        assert!(PeerMessage::decode(b"not json").is_err());
        assert!(PeerMessage::decode(br#"{"type": "goodbye", "instance_id": "x"}"#).is_err());
    }

    #[test]
    fn constructors_stamp_current_time() {
        let message = PeerMessage::heartbeat("me");
        assert_eq!(message.kind, PeerMessageKind::Heartbeat);
        assert!(message.timestamp > 1_600_000_000.0);
    }
}
