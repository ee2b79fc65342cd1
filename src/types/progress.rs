//! Progress snapshots broadcast to observers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-facing progress phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    #[serde(rename = "Ready")]
    Ready,
    #[serde(rename = "Sending frames...")]
    Sending,
    #[serde(rename = "Paused")]
    Paused,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProgressStatus::Ready => "Ready",
            ProgressStatus::Sending => "Sending frames...",
            ProgressStatus::Paused => "Paused",
        };
        f.write_str(label)
    }
}

/// Point-in-time transmission progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub frame: u32,
    pub total_frames: u16,
    pub status: ProgressStatus,
    pub percent: u32,
}

impl Progress {
    /// Build a snapshot, deriving `percent` from `frame / total_frames`.
    pub fn new(frame: u32, total_frames: u16, status: ProgressStatus) -> Self {
        let percent = match total_frames {
            0 => 0,
            total => (frame as u64 * 100 / total as u64) as u32,
        };
        Self { frame, total_frames, status, percent }
    }

    /// Initial snapshot before any transmission.
    pub fn ready(total_frames: u16) -> Self {
        Self::new(0, total_frames, ProgressStatus::Ready)
    }

    /// Same snapshot with a different frame.
    pub fn with_frame(self, frame: u32) -> Self {
        Self::new(frame, self.total_frames, self.status)
    }

    /// Same snapshot with a different status.
    pub fn with_status(self, status: ProgressStatus) -> Self {
        Self::new(self.frame, self.total_frames, status)
    }

    /// Same snapshot against a different total.
    pub fn with_total(self, total_frames: u16) -> Self {
        Self::new(self.frame, total_frames, self.status)
    }
}
