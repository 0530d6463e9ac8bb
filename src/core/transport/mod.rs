//! Transport layer for the serial link
//!
//! Owns the device, runs the background receive loop and writes bytes. It has
//! no knowledge of framing: received chunks go to a [`ChunkSink`], outbound
//! bytes arrive already packed.

mod serial;

pub use serial::{
    list_ports, SerialChannel, SerialConfig, SerialFlowControl, SerialParity, SystemPortOpener,
    READ_BUFFER_SIZE, READ_RETRY_BACKOFF,
};

use bytes::Bytes;
use std::io::{Read, Write};
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Device could not be opened
    #[error("Failed to open link: {0}")]
    LinkOpen(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Write attempted while the link is closed
    #[error("Not connected")]
    NotConnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error came from an open attempt
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            Self::LinkOpen(_) | Self::PortNotFound(_) | Self::PermissionDenied(_)
        )
    }
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TransportStats {
    /// Bytes written
    pub bytes_sent: u64,
    /// Bytes read
    pub bytes_received: u64,
    /// Completed writes
    pub writes: u64,
    /// Non-empty reads handed to the sink
    pub chunks_received: u64,
    /// Read failures that were retried
    pub read_errors: u64,
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RX:{}  TX:{}", self.bytes_received, self.bytes_sent)
    }
}

/// Consumer of raw received chunks.
///
/// Called from the receive thread, in arrival order, with non-empty chunks only.
#[cfg_attr(test, mockall::automock)]
pub trait ChunkSink: Send + Sync {
    /// Handle one chunk
    fn on_chunk(&self, chunk: Bytes);
}

impl<F> ChunkSink for F
where
    F: Fn(Bytes) + Send + Sync,
{
    fn on_chunk(&self, chunk: Bytes) {
        self(chunk);
    }
}

impl ChunkSink for crossbeam_channel::Sender<Bytes> {
    fn on_chunk(&self, chunk: Bytes) {
        if self.send(chunk).is_err() {
            tracing::trace!("chunk receiver dropped");
        }
    }
}

/// Independent read and write halves of an open device
pub struct PortHandles {
    /// Half used by the receive loop; reads must time out rather than block forever
    pub reader: Box<dyn Read + Send>,
    /// Half used by writes
    pub writer: Box<dyn Write + Send>,
}

/// Opens devices for a [`SerialChannel`]
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener: Send + Sync {
    /// Open the device described by `config`
    fn open(&self, config: &SerialConfig) -> Result<PortHandles, TransportError>;
}
