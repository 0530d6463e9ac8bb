//! Session tests over an in-memory device

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uartlink_core::core::protocol::{crc16_modbus, DeviceEvent, FrameShape, Output};
use uartlink_core::core::session::{Session, SessionEvent, SessionState};
use uartlink_core::core::transport::{PortHandles, PortOpener, SerialConfig, TransportError};

const PORT: &str = "/dev/loop0";

/// Device-to-host half: bytes pushed by the test, timeouts when idle
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "idle"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[derive(Clone, Default)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Loopback {
    device_rx: Receiver<Vec<u8>>,
    written: SharedWriter,
    opens: AtomicUsize,
}

impl PortOpener for Loopback {
    fn open(&self, config: &SerialConfig) -> Result<PortHandles, TransportError> {
        if config.port != PORT {
            return Err(TransportError::PortNotFound(config.port.clone()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(PortHandles {
            reader: Box::new(ChannelReader {
                rx: self.device_rx.clone(),
                pending: Vec::new(),
            }),
            writer: Box::new(self.written.clone()),
        })
    }
}

struct Rig {
    session: Session,
    events: broadcast::Receiver<SessionEvent>,
    device: Sender<Vec<u8>>,
    loopback: Arc<Loopback>,
}

fn rig() -> Rig {
    let (device, device_rx) = crossbeam_channel::unbounded();
    let loopback = Arc::new(Loopback {
        device_rx,
        written: SharedWriter::default(),
        opens: AtomicUsize::new(0),
    });
    let session = Session::with_opener(loopback.clone());
    let events = session.subscribe();
    Rig {
        session,
        events,
        device,
        loopback,
    }
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn connect_receive_command_disconnect() {
    let mut rig = rig();
    assert_eq!(rig.session.status_text(), "Not connected");

    rig.session.connect(SerialConfig::new(PORT, 115_200)).unwrap();
    assert!(rig.session.is_connected());
    assert_eq!(rig.session.status_text(), "Connected /dev/loop0 @ 115200");

    let event = wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::StateChanged { .. })
    })
    .await;
    let SessionEvent::StateChanged { state, status } = event else {
        unreachable!()
    };
    assert_eq!(state, SessionState::Connected);
    assert_eq!(status, "Connected /dev/loop0 @ 115200");

    // Sensor report split across two reads
    let report = FrameShape::mcu().pack(&[0x10, 0x00, 0x0F, 0xA0]);
    rig.device.send(report[..5].to_vec()).unwrap();
    rig.device.send(report[5..].to_vec()).unwrap();

    let event = wait_for(&mut rig.events, |e| matches!(e, SessionEvent::Device(_))).await;
    let SessionEvent::Device(DeviceEvent::Reading(reading)) = event else {
        unreachable!()
    };
    assert_eq!(reading.raw, 4000);

    // LED1 starts off: the first toggle sends "on" (0x02), the second "off" (0x03)
    assert!(rig.session.toggle_output(Output::Led1).await.unwrap());
    assert!(rig.session.outputs().led1);
    assert!(!rig.session.toggle_output(Output::Led1).await.unwrap());
    assert!(!rig.session.outputs().led1);

    let written = rig.loopback.written.0.lock().clone();
    assert_eq!(
        written[..10],
        [0xEF, 0x01, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x02, 0x81, 0xE5]
    );
    assert_eq!(
        written[10..],
        [0xEF, 0x01, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x03, 0x40, 0x25]
    );
    assert_eq!(
        &written[8..10],
        &crc16_modbus(&[0x00, 0x00, 0x00, 0x02]).to_le_bytes()
    );

    let stats = rig.session.stats();
    assert_eq!(stats.bytes_received, report.len() as u64);
    assert_eq!(stats.bytes_sent, 20);
    assert_eq!(stats.to_string(), format!("RX:{}  TX:20", report.len()));

    rig.session.disconnect();
    assert_eq!(rig.session.state(), SessionState::Disconnected);
    assert_eq!(rig.session.status_text(), "Disconnected");
    assert!(matches!(
        rig.session.send(&[0x00]).await,
        Err(TransportError::NotConnected)
    ));
}

#[tokio::test]
async fn reconnect_drops_partial_frame_and_keeps_counters() {
    let mut rig = rig();
    rig.session.connect(SerialConfig::new(PORT, 9600)).unwrap();

    rig.device.send(vec![0xEF, 0x01, 0x00]).unwrap();
    wait_for(&mut rig.events, |e| matches!(e, SessionEvent::DataReceived { .. })).await;
    assert_eq!(rig.session.pending_bytes(), 3);

    rig.session.connect(SerialConfig::new(PORT, 9600)).unwrap();
    assert_eq!(rig.session.pending_bytes(), 0);
    assert_eq!(rig.loopback.opens.load(Ordering::SeqCst), 2);
    assert_eq!(rig.session.stats().bytes_received, 3);

    // A full frame after reconnect still parses
    rig.device
        .send(FrameShape::mcu().pack(&[0x10, 0x00, 0x00, 0x00]))
        .unwrap();
    let event = wait_for(&mut rig.events, |e| matches!(e, SessionEvent::Device(_))).await;
    assert!(matches!(
        event,
        SessionEvent::Device(DeviceEvent::Reading(r)) if r.raw == 0
    ));
}

#[tokio::test]
async fn concurrent_toggles_alternate() {
    let mut rig = rig();
    rig.session.connect(SerialConfig::new(PORT, 115_200)).unwrap();

    let (first, second) = tokio::join!(
        rig.session.toggle_output(Output::Led0),
        rig.session.toggle_output(Output::Led0)
    );
    assert!(first.unwrap());
    assert!(!second.unwrap());
    assert!(!rig.session.outputs().led0);

    let written = rig.loopback.written.0.lock().clone();
    let codes: Vec<u8> = written.chunks(10).map(|frame| frame[7]).collect();
    assert_eq!(codes, vec![0x00, 0x01]);
}

#[tokio::test]
async fn failed_connect_leaves_session_idle() {
    let mut rig = rig();
    let err = rig
        .session
        .connect(SerialConfig::new("/dev/missing", 115_200))
        .unwrap_err();

    assert!(matches!(err, TransportError::PortNotFound(_)));
    assert!(err.is_open_failure());
    assert_eq!(rig.session.state(), SessionState::Idle);
    assert_eq!(rig.session.status_text(), "Not connected");
}

#[tokio::test]
async fn corrupted_report_surfaces_mismatch() {
    let mut rig = rig();
    rig.session.connect(SerialConfig::new(PORT, 115_200)).unwrap();

    let mut report = FrameShape::mcu().pack(&[0x10, 0x00, 0x0F, 0xA0]);
    let last = report.len() - 1;
    report[last] ^= 0x80;
    rig.device.send(report).unwrap();

    let event = wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::ChecksumMismatch { .. } | SessionEvent::Device(_))
    })
    .await;
    assert!(matches!(event, SessionEvent::ChecksumMismatch { .. }));
}
