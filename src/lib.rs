//! # UartLink Core Library
//!
//! Talks to a microcontroller over a serial link using delimited, CRC-16
//! checksummed frames:
//! - Configurable outbound frames (header, length, payload, CRC, trailer)
//! - Streaming inbound parser that resynchronizes past noise and corruption
//! - Background receive loop with cancellation
//! - Sensor report decoding and output switch commands
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartlink_core::{Output, SerialConfig, Session, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = Session::new();
//!     let mut rx = session.subscribe();
//!     session.connect(SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!
//!     session.toggle_output(Output::Led0).await?;
//!
//!     while let Ok(event) = rx.recv().await {
//!         if let SessionEvent::Device(reading) = event {
//!             println!("{:?}", reading);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::AppConfig;
pub use crate::core::codec::{Codec, CodecType};
pub use crate::core::protocol::{
    checksum, checksum_bytes_le, dispatch, pack, DeviceEvent, FrameCodec, FrameParser, FrameShape,
    Output, OutputCommand, ParseEvent, SensorReading,
};
pub use crate::core::session::{Session, SessionEvent, SessionState};
pub use crate::core::transport::{
    SerialChannel, SerialConfig, SerialFlowControl, SerialParity, TransportError, TransportStats,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
