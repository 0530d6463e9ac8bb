//! Serial port transport implementation

use super::{ChunkSink, PortHandles, PortOpener, TransportError, TransportStats};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scratch buffer size for one read
pub const READ_BUFFER_SIZE: usize = 4096;

/// Pause after a failed read before trying again
pub const READ_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Pause after a read that returned nothing
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

impl std::str::FromStr for SerialFlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "hardware" | "hw" | "rtscts" => Ok(Self::Hardware),
            "software" | "sw" | "xonxoff" => Ok(Self::Software),
            other => Err(format!("unknown flow control: {other}")),
        }
    }
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity: {other}")),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Read and write timeout in milliseconds
    pub timeout_ms: u64,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
            timeout_ms: 500,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Set read/write timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Read/write timeout as a duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Short description, e.g. `/dev/ttyUSB0 @ 115200 baud (8N1)`
    pub fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits,
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM1" } else { "/dev/ttyUSB0" };
        Self::new(port, 115_200)
    }
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, config: &SerialConfig) -> Result<PortHandles, TransportError> {
        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match config.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let map_err = |e: serialport::Error| match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
            serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                TransportError::PortNotFound(config.port.clone())
            }
            serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                TransportError::PermissionDenied(config.port.clone())
            }
            _ => TransportError::LinkOpen(format!("{}: {}", config.port, e)),
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(config.timeout_duration())
            .open()
            .map_err(map_err)?;
        let reader = port.try_clone().map_err(map_err)?;

        Ok(PortHandles {
            reader: Box::new(reader),
            writer: Box::new(port),
        })
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::Io(e.into()))
}

/// Receive loop state of one open session
struct ReadSession {
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

/// Serial link: one background receive thread plus on-demand writes.
///
/// The reader and writer halves are independent handles, so a write never
/// waits on a read in progress.
pub struct SerialChannel {
    opener: Arc<dyn PortOpener>,
    sink: Arc<dyn ChunkSink>,
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    stats: Arc<RwLock<TransportStats>>,
    session: Option<ReadSession>,
}

impl SerialChannel {
    /// Channel over real serial ports delivering chunks to `sink`
    pub fn new(sink: Arc<dyn ChunkSink>) -> Self {
        Self::with_opener(Arc::new(SystemPortOpener), sink)
    }

    /// Channel over a custom device opener
    pub fn with_opener(opener: Arc<dyn PortOpener>, sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            opener,
            sink,
            writer: Arc::new(Mutex::new(None)),
            stats: Arc::new(RwLock::new(TransportStats::default())),
            session: None,
        }
    }

    /// Open the link and start the receive loop, closing any previous session first
    pub fn open(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        if self.session.is_some() {
            self.close();
        }

        let PortHandles { reader, writer } = self.opener.open(config)?;

        let cancel = CancellationToken::new();
        let handle = thread::Builder::new()
            .name(format!("rx:{}", config.port))
            .spawn({
                let cancel = cancel.clone();
                let sink = Arc::clone(&self.sink);
                let stats = Arc::clone(&self.stats);
                move || read_loop(reader, sink.as_ref(), &cancel, &stats)
            })?;

        *self.writer.lock() = Some(writer);
        self.session = Some(ReadSession {
            cancel,
            reader: Some(handle),
        });

        tracing::info!("Opened {}", config.connection_info());
        Ok(())
    }

    /// Check if the link is open
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Write all of `data` and flush
    pub async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }

        let writer = Arc::clone(&self.writer);
        let stats = Arc::clone(&self.stats);
        let data = Bytes::copy_from_slice(data);

        tokio::task::spawn_blocking(move || -> Result<(), TransportError> {
            let mut guard = writer.lock();
            let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
            port.write_all(&data)?;
            port.flush()?;

            let mut stats = stats.write();
            stats.bytes_sent += data.len() as u64;
            stats.writes += 1;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Io(io::Error::other(e)))?
    }

    /// Stop the receive loop and release the device. Safe to call repeatedly.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.cancel.cancel();
        self.writer.lock().take();

        if let Some(handle) = session.reader.take() {
            // Joining from inside the sink would wait on ourselves.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("receive loop panicked");
            }
        }

        tracing::info!("Link closed");
    }

    /// Cumulative byte counters
    pub fn stats(&self) -> TransportStats {
        *self.stats.read()
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    sink: &dyn ChunkSink,
    cancel: &CancellationToken,
    stats: &RwLock<TransportStats>,
) {
    let mut scratch = vec![0u8; READ_BUFFER_SIZE];

    while !cancel.is_cancelled() {
        match reader.read(&mut scratch) {
            Ok(0) => thread::sleep(IDLE_POLL),
            Ok(n) => {
                if cancel.is_cancelled() {
                    break;
                }
                {
                    let mut stats = stats.write();
                    stats.bytes_received += n as u64;
                    stats.chunks_received += 1;
                }
                sink.on_chunk(Bytes::copy_from_slice(&scratch[..n]));
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                // TODO: cap consecutive failures and report the link as lost
                // instead of retrying forever
                tracing::warn!("Read failed, retrying: {}", e);
                stats.write().read_errors += 1;
                thread::sleep(READ_RETRY_BACKOFF);
            }
        }
    }

    tracing::debug!("Receive loop stopped");
}
