//! Operator-facing data codecs
//!
//! Converts between what an operator types or reads and raw link bytes:
//! - Text (ASCII)
//! - Hexadecimal (`EF 01 00 0A`)

mod hex;
mod text;

pub use self::hex::{format_hex, parse_hex, HexCodec};
pub use text::TextCodec;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Codec type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    /// Plain ASCII text
    #[default]
    Text,
    /// Space separated hex pairs
    Hex,
}

/// Codec trait for data transformation
pub trait Codec: Send + Sync {
    /// Encode bytes to display string
    fn encode(&self, data: &[u8]) -> String;

    /// Decode operator input to bytes
    fn decode(&self, text: &str) -> Result<Bytes, CodecError>;

    /// Get codec type
    fn codec_type(&self) -> CodecType;
}

/// Codec errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Invalid input format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Hex input with an odd number of digits
    #[error("Hex input must have an even number of digits (got {0})")]
    OddHexLength(usize),
}

/// Create a codec from type
pub fn create_codec(codec_type: CodecType) -> Box<dyn Codec> {
    match codec_type {
        CodecType::Text => Box::new(TextCodec::new()),
        CodecType::Hex => Box::new(HexCodec::new()),
    }
}
