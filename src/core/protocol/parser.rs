//! Streaming, resynchronizing frame parser for the receive direction
//!
//! Inbound frames from the microcontroller always have the fixed layout
//!
//! ```text
//! EF 01 | LEN_HI LEN_LO | payload (LEN - 6 bytes) | CRC_LO CRC_HI
//! ```
//!
//! where `LEN` is the total frame length and the CRC-16/Modbus covers the
//! payload only. Bytes arrive in arbitrary chunks; the parser buffers them,
//! hunts for the marker, and emits every complete frame it can validate.
//! Garbage and corrupt frames are skipped, never surfaced as errors.

use super::checksum::{crc16_modbus, CHECKSUM_LEN};
use super::frame::FrameShape;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Sync marker every inbound frame starts with
pub const RX_MARKER: [u8; 2] = [0xEF, 0x01];

/// Marker plus the big-endian total-length field
pub const RX_PREFIX_LEN: usize = RX_MARKER.len() + 2;

/// Marker, length and checksum: everything that is not payload
pub const RX_OVERHEAD: usize = RX_PREFIX_LEN + CHECKSUM_LEN;

/// Smallest acceptable total length
pub const MIN_FRAME_LEN: usize = RX_OVERHEAD;

/// Largest acceptable total length
pub const MAX_FRAME_LEN: usize = 1024;

/// Outcome of parsing one candidate frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A complete frame whose checksum matched; carries the payload only
    Payload(Bytes),
    /// A complete frame was dropped because its checksum did not match
    ChecksumMismatch {
        /// CRC computed over the received payload
        expected: u16,
        /// CRC carried by the frame
        received: u16,
    },
}

enum Step {
    Emit(ParseEvent),
    Again,
    NeedMore,
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(RX_MARKER.len()).position(|w| w == RX_MARKER)
}

/// Run the state machine once over `buf`.
fn step(buf: &mut BytesMut) -> Step {
    let Some(start) = find_marker(buf) else {
        if !buf.is_empty() {
            tracing::debug!(bytes = buf.len(), "no frame marker, discarding buffer");
            buf.clear();
        }
        return Step::NeedMore;
    };

    if start > 0 {
        tracing::debug!(bytes = start, "discarding noise before frame marker");
        buf.advance(start);
    }

    if buf.len() < RX_PREFIX_LEN {
        return Step::NeedMore;
    }

    let total = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total) {
        // Skip a single byte so a real marker overlapping this one is not lost.
        tracing::debug!(length = total, "invalid frame length, resyncing");
        buf.advance(1);
        return Step::Again;
    }

    if buf.len() < total {
        return Step::NeedMore;
    }

    let frame = buf.split_to(total).freeze();
    let payload_len = total - RX_OVERHEAD;
    if payload_len == 0 {
        return Step::Again;
    }

    let payload = frame.slice(RX_PREFIX_LEN..RX_PREFIX_LEN + payload_len);
    let received = u16::from_le_bytes([frame[total - 2], frame[total - 1]]);
    let expected = crc16_modbus(&payload);

    if expected == received {
        Step::Emit(ParseEvent::Payload(payload))
    } else {
        tracing::warn!(
            expected = format_args!("{expected:04X}"),
            received = format_args!("{received:04X}"),
            "frame checksum mismatch, dropped"
        );
        Step::Emit(ParseEvent::ChecksumMismatch { expected, received })
    }
}

/// Incremental parser owning the receive buffer.
///
/// The buffer sits behind one lock that is held for exactly one [`feed`](Self::feed)
/// call, so the parser can be shared with the receive thread by reference.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Mutex<BytesMut>,
}

impl FrameParser {
    /// Create a parser with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every event the buffer now yields, in order
    pub fn feed(&self, chunk: &[u8]) -> Vec<ParseEvent> {
        let mut buffer = self.buffer.lock();
        buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            match step(&mut buffer) {
                Step::Emit(event) => events.push(event),
                Step::Again => {}
                Step::NeedMore => break,
            }
        }
        events
    }

    /// Bytes currently held waiting for the rest of a frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drop everything buffered
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

/// `tokio_util` codec speaking the microcontroller protocol.
///
/// Decoding uses the fixed receive layout; encoding packs payloads with the
/// configured outbound [`FrameShape`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    shape: FrameShape,
}

impl FrameCodec {
    /// Codec that encodes with the given shape
    pub fn new(shape: FrameShape) -> Self {
        Self { shape }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(FrameShape::mcu())
    }
}

impl Decoder for FrameCodec {
    type Item = ParseEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match step(src) {
                Step::Emit(event) => return Ok(Some(event)),
                Step::Again => {}
                Step::NeedMore => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(event) => Ok(Some(event)),
            None => {
                if !src.is_empty() {
                    tracing::debug!(bytes = src.len(), "stream ended inside a frame");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&self.shape.pack(&item));
        Ok(())
    }
}
