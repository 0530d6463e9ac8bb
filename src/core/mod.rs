//! Core module containing the main functionality of UartLink
//!
//! This module provides:
//! - Link protocol: checksum, frame packing, streaming parser, command table
//! - Transport layer for serial ports
//! - Session management tying transport, parser and dispatcher together
//! - Codecs for operator text and hex

pub mod codec;
pub mod protocol;
pub mod session;
pub mod transport;
