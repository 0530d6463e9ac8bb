//! Microcontroller link protocol
//!
//! - CRC-16/Modbus checksum
//! - Configurable outbound framing
//! - Streaming, resynchronizing inbound parser
//! - Command table (sensor reports in, output switches out)

pub mod checksum;
pub mod command;
pub mod frame;
pub mod parser;

pub use checksum::{checksum, checksum_bytes_le, crc16_modbus};
pub use command::{dispatch, DeviceEvent, Output, OutputCommand, OutputStates, SensorReading};
pub use frame::{pack, FrameShape, MCU_HEADER};
pub use parser::{FrameCodec, FrameParser, ParseEvent, MAX_FRAME_LEN, MIN_FRAME_LEN, RX_MARKER};
