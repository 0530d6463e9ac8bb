//! Hexadecimal codec for frame bytes

use super::{Codec, CodecError, CodecType};
use bytes::Bytes;

/// Render bytes as uppercase pairs separated by single spaces
pub fn format_hex(data: &[u8]) -> String {
    let mut output = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(&format!("{byte:02X}"));
    }
    output
}

/// Parse operator hex input.
///
/// `0x` prefixes and any character that is not a hex digit are ignored, so
/// `"EF 01"`, `"ef,01"` and `"0xEF 0x01"` are all accepted.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned: String = text
        .replace("0x", "")
        .replace("0X", "")
        .chars()
        .filter(char::is_ascii_hexdigit)
        .collect();

    if cleaned.len() % 2 != 0 {
        return Err(CodecError::OddHexLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| CodecError::InvalidFormat(e.to_string()))
}

/// Hex codec for binary data
#[derive(Debug, Default, Clone, Copy)]
pub struct HexCodec;

impl HexCodec {
    /// Create a new hex codec
    pub fn new() -> Self {
        Self
    }
}

impl Codec for HexCodec {
    fn encode(&self, data: &[u8]) -> String {
        format_hex(data)
    }

    fn decode(&self, text: &str) -> Result<Bytes, CodecError> {
        parse_hex(text).map(Bytes::from)
    }

    fn codec_type(&self) -> CodecType {
        CodecType::Hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_upper() {
        assert_eq!(HexCodec::new().encode(&[0xEF, 0x01, 0x00, 0x0A]), "EF 01 00 0A");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_decode() {
        let result = HexCodec::new().decode("48 65 6C 6C 6F").unwrap();
        assert_eq!(&result[..], b"Hello");
    }

    #[test]
    fn test_decode_with_prefix_and_separators() {
        assert_eq!(parse_hex("0xEF, 0x01").unwrap(), vec![0xEF, 0x01]);
        assert_eq!(parse_hex("ef-01\r\n0a").unwrap(), vec![0xEF, 0x01, 0x0A]);
    }

    #[test]
    fn test_decode_odd_length() {
        assert_eq!(parse_hex("EF 0"), Err(CodecError::OddHexLength(3)));
    }

    #[test]
    fn test_decode_empty() {
        assert!(parse_hex("  ").unwrap().is_empty());
    }
}
