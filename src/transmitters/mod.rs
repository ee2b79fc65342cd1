//! Transmitter implementations

pub mod datagram;
pub mod memory;
pub mod sacn_output;
pub mod unavailable;

pub use datagram::DatagramTransmitter;
pub use memory::{MemoryTransmitter, SentPayload};
pub use sacn_output::SacnTransmitter;
pub use unavailable::UnavailableTransmitter;
