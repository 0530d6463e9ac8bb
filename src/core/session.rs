//! Session management for the microcontroller link
//!
//! A Session wires the pieces together: the serial channel feeds raw chunks
//! to the frame parser, validated payloads go through the command table, and
//! everything of interest is broadcast as [`SessionEvent`]s. Outbound, it
//! packs frames and tracks the commanded output states.

use super::protocol::{
    dispatch, DeviceEvent, FrameParser, FrameShape, Output, OutputCommand, OutputStates,
    ParseEvent,
};
use super::transport::{
    PortOpener, SerialChannel, SerialConfig, SystemPortOpener, TransportError, TransportStats,
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 1024;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Never connected
    Idle,
    /// Link open
    Connected,
    /// Link closed after having been open
    Disconnected,
}

/// Session events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// State changed
    StateChanged {
        /// New state
        state: SessionState,
        /// Human-readable status line
        status: String,
    },
    /// Raw chunk received from the link
    DataReceived {
        /// Chunk bytes
        #[serde(serialize_with = "as_hex")]
        data: Bytes,
    },
    /// Bytes written to the link
    DataSent {
        /// Written bytes
        #[serde(serialize_with = "as_hex")]
        data: Bytes,
    },
    /// A frame passed validation
    FrameReceived {
        /// Frame payload
        #[serde(serialize_with = "as_hex")]
        payload: Bytes,
    },
    /// A frame failed its checksum and was dropped
    ChecksumMismatch {
        /// CRC computed over the payload
        expected: u16,
        /// CRC carried by the frame
        received: u16,
    },
    /// Decoded device event
    Device(DeviceEvent),
    /// An output switch command was sent
    OutputChanged {
        /// Output
        output: Output,
        /// New state
        on: bool,
    },
}

fn as_hex<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&crate::core::codec::format_hex(data))
}

/// Route one received chunk through the parser and dispatcher
fn handle_chunk(parser: &FrameParser, events: &broadcast::Sender<SessionEvent>, chunk: Bytes) {
    let parsed = parser.feed(&chunk);
    let _ = events.send(SessionEvent::DataReceived { data: chunk });

    for event in parsed {
        match event {
            ParseEvent::Payload(payload) => {
                let device = dispatch(&payload);
                let _ = events.send(SessionEvent::FrameReceived { payload });
                if let Some(device) = device {
                    let _ = events.send(SessionEvent::Device(device));
                }
            }
            ParseEvent::ChecksumMismatch { expected, received } => {
                let _ = events.send(SessionEvent::ChecksumMismatch { expected, received });
            }
        }
    }
}

/// Active link session
pub struct Session {
    channel: SerialChannel,
    parser: Arc<FrameParser>,
    event_tx: broadcast::Sender<SessionEvent>,
    state: SessionState,
    config: Option<SerialConfig>,
    outputs: Mutex<OutputStates>,
    toggling: tokio::sync::Mutex<()>,
}

impl Session {
    /// Session over real serial ports
    pub fn new() -> Self {
        Self::with_opener(Arc::new(SystemPortOpener))
    }

    /// Session over a custom device opener
    pub fn with_opener(opener: Arc<dyn PortOpener>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let parser = Arc::new(FrameParser::new());

        let sink = {
            let parser = Arc::clone(&parser);
            let events = event_tx.clone();
            move |chunk: Bytes| handle_chunk(&parser, &events, chunk)
        };

        Self {
            channel: SerialChannel::with_opener(opener, Arc::new(sink)),
            parser,
            event_tx,
            state: SessionState::Idle,
            config: None,
            outputs: Mutex::new(OutputStates::default()),
            toggling: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the link, replacing any current connection
    pub fn connect(&mut self, config: SerialConfig) -> Result<(), TransportError> {
        if self.channel.is_open() {
            self.disconnect();
        }
        self.parser.clear();

        if let Err(e) = self.channel.open(&config) {
            tracing::warn!("Connect failed: {}", e);
            return Err(e);
        }

        self.config = Some(config);
        self.set_state(SessionState::Connected);
        Ok(())
    }

    /// Close the link
    pub fn disconnect(&mut self) {
        if !self.channel.is_open() {
            return;
        }
        self.channel.close();
        self.set_state(SessionState::Disconnected);
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        let _ = self.event_tx.send(SessionEvent::StateChanged {
            state,
            status: self.status_text(),
        });
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    /// Status line for display
    pub fn status_text(&self) -> String {
        match (self.state, &self.config) {
            (SessionState::Connected, Some(cfg)) => {
                format!("Connected {} @ {}", cfg.port, cfg.baud_rate)
            }
            (SessionState::Disconnected, _) => "Disconnected".to_string(),
            _ => "Not connected".to_string(),
        }
    }

    /// Write raw bytes
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.channel.write(data).await?;
        let _ = self.event_tx.send(SessionEvent::DataSent {
            data: Bytes::copy_from_slice(data),
        });
        Ok(())
    }

    /// Pack `payload` with `shape`, write it and return the wire bytes
    pub async fn send_frame(
        &self,
        shape: &FrameShape,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let frame = shape.pack(payload);
        self.send(&frame).await?;
        Ok(frame)
    }

    /// Send an output switch command; the remembered state changes only if the write succeeds
    pub async fn send_command(&self, command: OutputCommand) -> Result<(), TransportError> {
        self.send_frame(&FrameShape::mcu(), &command.payload()).await?;
        self.outputs.lock().set(command.output, command.on);
        let _ = self.event_tx.send(SessionEvent::OutputChanged {
            output: command.output,
            on: command.on,
        });
        Ok(())
    }

    /// Flip `output` and return its new state.
    ///
    /// Toggles are serialized: each one reads the state the previous one left.
    pub async fn toggle_output(&self, output: Output) -> Result<bool, TransportError> {
        let _turn = self.toggling.lock().await;
        let command = self.outputs.lock().toggle_command(output);
        self.send_command(command).await?;
        Ok(command.on)
    }

    /// Last commanded output states
    pub fn outputs(&self) -> OutputStates {
        *self.outputs.lock()
    }

    /// Byte counters
    pub fn stats(&self) -> TransportStats {
        self.channel.stats()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Bytes waiting in the receive buffer for the rest of a frame
    pub fn pending_bytes(&self) -> usize {
        self.parser.buffered_len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_handle_chunk_emits_reading() {
        let parser = FrameParser::new();
        let (tx, mut rx) = broadcast::channel(16);

        let frame = FrameShape::mcu().pack(&[0x10, 0x00, 0x0F, 0xA0]);
        handle_chunk(&parser, &tx, Bytes::from(frame));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SessionEvent::DataReceived { .. }));
        assert!(matches!(events[1], SessionEvent::FrameReceived { .. }));
        match events[2] {
            SessionEvent::Device(DeviceEvent::Reading(r)) => assert_eq!(r.raw, 4000),
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_handle_chunk_reports_checksum_mismatch() {
        let parser = FrameParser::new();
        let (tx, mut rx) = broadcast::channel(16);

        let mut frame = FrameShape::mcu().pack(&[0x10, 0x00, 0x0F, 0xA0]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        handle_chunk(&parser, &tx, Bytes::from(frame));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], SessionEvent::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_status_text_before_connect() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.status_text(), "Not connected");
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_toggle_without_link_keeps_state() {
        let session = Session::new();
        let err = session.toggle_output(Output::Led0).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(!session.outputs().led0);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::FrameReceived {
            payload: Bytes::from_static(&[0x10, 0x00]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "frame_received");
        assert_eq!(json["payload"], "10 00");
    }
}
