//! Core types shared by the engine, the conductor and observers.
//!
//! - [`encode_frame`] / [`decode_frame`] map the frame counter onto the first
//!   two payload channels
//! - [`TransmissionStatus`] is derived from the engine's `running`/`paused` flags
//! - [`Progress`] is the snapshot pushed to progress subscribers
//! - [`UpdateRate`] selects how often a subscriber wants snapshots
//!
//! ## Usage Example
//!
//! ```rust
//! use frame_conductor::types::{decode_frame, encode_frame};
//!
//! let payload = encode_frame(1000, 512);
//! assert_eq!(payload[0], 0x03);
//! assert_eq!(payload[1], 0xE8);
//! assert_eq!(decode_frame(&payload), Some(1000));
//! ```

mod payload;
mod progress;
mod status;
mod update_rate;

pub use payload::{
    FRAME_BYTES, PAYLOAD_LENGTH_RANGE, UNIVERSE_RANGE, decode_frame, encode_frame, write_frame,
};
pub use progress::{Progress, ProgressStatus};
pub use status::{ControlAction, TransmissionStatus};
pub use update_rate::UpdateRate;
