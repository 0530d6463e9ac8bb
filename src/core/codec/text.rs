//! ASCII text codec

use super::{Codec, CodecError, CodecType};
use bytes::Bytes;

/// Substitute for anything that is not 7-bit ASCII
const REPLACEMENT: u8 = b'?';

/// Text codec: operator text goes out as ASCII, received bytes are shown as ASCII
#[derive(Debug, Clone, Copy)]
pub struct TextCodec {
    append_crlf: bool,
}

impl TextCodec {
    /// Create a new text codec
    pub fn new() -> Self {
        Self { append_crlf: false }
    }

    /// Terminate every decoded line with CR LF
    #[must_use]
    pub fn append_crlf(mut self, enable: bool) -> Self {
        self.append_crlf = enable;
        self
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for TextCodec {
    fn encode(&self, data: &[u8]) -> String {
        data.iter()
            .map(|&b| if b.is_ascii() { b as char } else { REPLACEMENT as char })
            .collect()
    }

    fn decode(&self, text: &str) -> Result<Bytes, CodecError> {
        let mut output: Vec<u8> = text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { REPLACEMENT })
            .collect();
        if self.append_crlf {
            output.extend_from_slice(b"\r\n");
        }
        Ok(Bytes::from(output))
    }

    fn codec_type(&self) -> CodecType {
        CodecType::Text
    }
}
