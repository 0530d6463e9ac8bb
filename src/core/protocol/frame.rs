//! Outbound frame shape and serializer
//!
//! A frame on the send side is
//! `header | [total length, u16 BE] | payload | [CRC-16 LE] | [trailer]`
//! where every bracketed part is optional. The receive side is fixed and lives
//! in [`super::parser`]; the two are deliberately separate shapes.

use super::checksum::{checksum_bytes_le, CHECKSUM_LEN};
use serde::{Deserialize, Serialize};

/// Size of the total-length field
pub const LENGTH_FIELD_LEN: usize = 2;

/// Sync marker used by the microcontroller protocol
pub const MCU_HEADER: [u8; 2] = [0xEF, 0x01];

/// Configurable layout of an outbound frame
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameShape {
    /// Literal bytes prefixed to every frame
    pub header: Vec<u8>,
    /// Literal bytes appended after the checksum
    pub trailer: Option<Vec<u8>>,
    /// Append a CRC-16/Modbus of the payload
    pub use_checksum: bool,
    /// Emit a big-endian total-length field after the header
    pub use_length: bool,
}

impl FrameShape {
    /// Create a shape with the given header and no optional parts
    pub fn new(header: impl Into<Vec<u8>>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// Shape the microcontroller expects: `EF 01`, length and checksum, no trailer
    pub fn mcu() -> Self {
        Self::new(MCU_HEADER).with_length(true).with_checksum(true)
    }

    /// Set the trailer; an empty trailer is the same as none
    #[must_use]
    pub fn with_trailer(mut self, trailer: impl Into<Vec<u8>>) -> Self {
        let trailer = trailer.into();
        self.trailer = (!trailer.is_empty()).then_some(trailer);
        self
    }

    /// Enable or disable the checksum
    #[must_use]
    pub fn with_checksum(mut self, enable: bool) -> Self {
        self.use_checksum = enable;
        self
    }

    /// Enable or disable the length field
    #[must_use]
    pub fn with_length(mut self, enable: bool) -> Self {
        self.use_length = enable;
        self
    }

    fn trailer_len(&self) -> usize {
        self.trailer.as_ref().map_or(0, Vec::len)
    }

    /// Number of bytes `pack` emits for a payload of `payload_len` bytes
    pub fn frame_len(&self, payload_len: usize) -> usize {
        self.header.len()
            + if self.use_length { LENGTH_FIELD_LEN } else { 0 }
            + payload_len
            + if self.use_checksum { CHECKSUM_LEN } else { 0 }
            + self.trailer_len()
    }

    /// Value written into the length field.
    ///
    /// Truncated to 16 bits, matching the field width.
    #[allow(clippy::cast_possible_truncation)]
    pub fn length_field(&self, payload_len: usize) -> u16 {
        // The field counts itself, so it is the full frame length whenever present.
        (self.header.len()
            + LENGTH_FIELD_LEN
            + payload_len
            + if self.use_checksum { CHECKSUM_LEN } else { 0 }
            + self.trailer_len()) as u16
    }

    /// Serialize `payload` into wire bytes
    pub fn pack(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.frame_len(payload.len()));

        out.extend_from_slice(&self.header);
        if self.use_length {
            out.extend_from_slice(&self.length_field(payload.len()).to_be_bytes());
        }
        out.extend_from_slice(payload);
        if self.use_checksum {
            out.extend_from_slice(&checksum_bytes_le(payload, 0, payload.len()));
        }
        if let Some(trailer) = self.trailer.as_deref().filter(|t| !t.is_empty()) {
            out.extend_from_slice(trailer);
        }

        out
    }
}

/// Serialize `payload` with `shape`
pub fn pack(shape: &FrameShape, payload: &[u8]) -> Vec<u8> {
    shape.pack(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::checksum::crc16_modbus;

    #[test]
    fn test_mcu_command_frame() {
        let payload = [0x00, 0x00, 0x00, 0x00];
        let frame = pack(&FrameShape::mcu(), &payload);

        assert_eq!(frame.len(), 10);
        assert_eq!(&frame[..2], &[0xEF, 0x01]);
        assert_eq!(&frame[2..4], &[0x00, 0x0A]);
        assert_eq!(&frame[4..8], &payload);
        assert_eq!(&frame[8..], &crc16_modbus(&payload).to_le_bytes());
    }

    #[test]
    fn test_header_only() {
        let shape = FrameShape::new([0xAA]);
        assert_eq!(shape.pack(&[1, 2, 3]), vec![0xAA, 1, 2, 3]);
    }

    #[test]
    fn test_length_counts_trailer_and_itself() {
        let shape = FrameShape::new([0x55, 0xAA])
            .with_length(true)
            .with_checksum(true)
            .with_trailer([0x0D, 0x0A]);
        let frame = shape.pack(b"hello");

        // 2 header + 2 length + 5 payload + 2 crc + 2 trailer
        assert_eq!(frame.len(), 13);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 13);
        assert_eq!(&frame[11..], &[0x0D, 0x0A]);
        assert_eq!(&frame[9..11], &crc16_modbus(b"hello").to_le_bytes());
    }

    #[test]
    fn test_checksum_without_length() {
        let shape = FrameShape::new([0x7E]).with_checksum(true);
        let frame = shape.pack(&[0x01]);
        assert_eq!(frame.len(), 4);
        assert_eq!(&frame[2..], &crc16_modbus(&[0x01]).to_le_bytes());
    }

    #[test]
    fn test_empty_trailer_is_dropped() {
        let shape = FrameShape::new([0x01]).with_trailer(Vec::new());
        assert_eq!(shape.trailer, None);

        let mut raw = FrameShape::new([0x01]).with_length(true);
        raw.trailer = Some(Vec::new());
        assert_eq!(raw.pack(&[0x02]), vec![0x01, 0x00, 0x04, 0x02]);
    }

    #[test]
    fn test_frame_len_matches_pack() {
        let shape = FrameShape::mcu().with_trailer([0x03]);
        for n in [0, 1, 17, 300] {
            let payload = vec![0x5A; n];
            assert_eq!(shape.pack(&payload).len(), shape.frame_len(n));
        }
    }
}
