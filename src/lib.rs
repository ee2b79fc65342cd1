//! Frame-counter transmission for lighting networks.
//!
//! Frame Conductor repeatedly sends a fixed-length payload to one lighting
//! universe at a fixed frame rate. The first two bytes of every payload carry
//! a 16-bit frame counter (big-endian), so downstream receivers can follow
//! playback position. A UDP coordinator makes sure only one conductor per
//! broadcast domain transmits at a time.
//!
//! # Features
//!
//! - **Paced transmission**: start, pause, resume, retarget and stop a
//!   rate-paced counter ([`Engine`])
//! - **Control context**: guarded control actions, progress snapshots and
//!   persisted configuration ([`Conductor`])
//! - **Network singleton**: check/response/heartbeat over UDP broadcast
//!   ([`Coordinator`])
//! - **Pluggable output**: any [`Transmitter`]; sACN, in-memory, unavailable
//!   and raw debug datagram implementations ship in [`transmitters`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use frame_conductor::{Conductor, ConductorConfig, Coordinator, CoordinatorConfig};
//! use frame_conductor::transmitters::SacnTransmitter;
//!
//! #[tokio::main]
//! async fn main() -> frame_conductor::Result<()> {
//!     let coordinator = Coordinator::new(CoordinatorConfig::default()).await;
//!     if !coordinator.start().await {
//!         return Ok(());
//!     }
//!
//!     let conductor = Conductor::new(ConductorConfig::default(), SacnTransmitter::new());
//!     conductor.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!
//!     conductor.shutdown().await;
//!     coordinator.stop();
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Transmission
pub mod conductor;
pub mod engine;
pub mod stream;
pub mod transmitter;
pub mod transmitters;

// Network coordination
pub mod coordinator;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use conductor::{Conductor, ConductorState};
pub use config::{ConductorConfig, ConfigStore, ConfigUpdate};
pub use coordinator::{ClaimOutcome, Coordinator, CoordinatorConfig, CoordinatorState};
pub use engine::{Engine, FrameObserver};
pub use transmitter::Transmitter;
