//! Frame counter encoding into DMX payloads
//!
//! The counter occupies the first two channels of the payload:
//!
//! ```text
//! channel 1 (byte 0): (frame >> 8) & 0xFF   most significant byte
//! channel 2 (byte 1):  frame       & 0xFF   least significant byte
//! channels 3..N:       0
//! ```

use std::ops::RangeInclusive;

/// Valid universe numbers for the lighting protocol.
pub const UNIVERSE_RANGE: RangeInclusive<u16> = 1..=63999;

/// Valid payload lengths (DMX channel counts).
pub const PAYLOAD_LENGTH_RANGE: RangeInclusive<usize> = 24..=512;

/// Number of payload bytes carrying the frame counter.
pub const FRAME_BYTES: usize = 2;

/// Encode `frame` into a zeroed payload of `payload_length` bytes.
///
/// Lengths shorter than [`FRAME_BYTES`] are raised so the counter always fits.
pub fn encode_frame(frame: u16, payload_length: usize) -> Vec<u8> {
    let mut payload = vec![0u8; payload_length.max(FRAME_BYTES)];
    write_frame(&mut payload, frame);
    payload
}

/// Write `frame` into the first two bytes of an existing buffer.
///
/// Buffers shorter than [`FRAME_BYTES`] are left untouched.
pub fn write_frame(payload: &mut [u8], frame: u16) {
    if let Some(slot) = payload.get_mut(..FRAME_BYTES) {
        slot.copy_from_slice(&frame.to_be_bytes());
    }
}

/// Recover the frame counter from a payload.
pub fn decode_frame(payload: &[u8]) -> Option<u16> {
    match payload {
        [msb, lsb, ..] => Some(((*msb as u16) << 8) | *lsb as u16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn frame_bytes_are_msb_first() {
        let payload = encode_frame(0x1234, 512);
        assert_eq!(payload.len(), 512);
        assert_eq!(payload[0], 0x12);
        assert_eq!(payload[1], 0x34);
        assert!(payload[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_lengths_still_hold_the_counter() {
        assert_eq!(encode_frame(258, 0), vec![1, 2]);
        assert_eq!(decode_frame(&[7]), None);
    }

    #[test]
    fn rewriting_a_buffer_replaces_only_the_counter() {
        let mut payload = encode_frame(65535, 24);
        write_frame(&mut payload, 1);
        assert_eq!(&payload[..2], &[0, 1]);
        assert_eq!(payload.len(), 24);
    }

    proptest! {
        #[test]
        fn every_frame_survives_encoding(frame in 0u16..=u16::MAX, len in 2usize..=512) {
            let payload = encode_frame(frame, len);
            prop_assert_eq!(payload.len(), len);
            prop_assert_eq!(decode_frame(&payload), Some(frame));
        }
    }
}
