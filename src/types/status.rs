//! Transmission status derived from the engine's control flags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived engine status.
///
/// Computed from the `running` and `paused` flags; `paused` is ignored when
/// the engine is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionStatus {
    Stopped,
    Paused,
    Running,
}

impl TransmissionStatus {
    /// Derive a status from the raw flags.
    pub fn from_flags(running: bool, paused: bool) -> Self {
        match (running, paused) {
            (false, _) => TransmissionStatus::Stopped,
            (true, true) => TransmissionStatus::Paused,
            (true, false) => TransmissionStatus::Running,
        }
    }

    /// Control actions that make sense from this status.
    pub fn available_actions(self) -> &'static [ControlAction] {
        match self {
            TransmissionStatus::Stopped => &[ControlAction::Start],
            TransmissionStatus::Paused => &[ControlAction::Resume, ControlAction::Reset],
            TransmissionStatus::Running => &[ControlAction::Pause, ControlAction::Reset],
        }
    }
}

impl fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransmissionStatus::Stopped => "Stopped",
            TransmissionStatus::Paused => "Paused",
            TransmissionStatus::Running => "Running",
        };
        f.write_str(name)
    }
}

/// Control actions exposed to an external control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_flag_is_ignored_when_stopped() {
        assert_eq!(TransmissionStatus::from_flags(false, true), TransmissionStatus::Stopped);
        assert_eq!(TransmissionStatus::from_flags(true, true), TransmissionStatus::Paused);
        assert_eq!(TransmissionStatus::from_flags(true, false), TransmissionStatus::Running);
    }

    #[test]
    fn actions_follow_status() {
        assert_eq!(TransmissionStatus::Stopped.available_actions(), &[ControlAction::Start]);
        assert_eq!(
            TransmissionStatus::Paused.available_actions(),
            &[ControlAction::Resume, ControlAction::Reset]
        );
        assert_eq!(
            TransmissionStatus::Running.available_actions(),
            &[ControlAction::Pause, ControlAction::Reset]
        );
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&TransmissionStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
        assert_eq!(TransmissionStatus::Running.to_string(), "Running");
    }
}
