use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use voicelink_types::{JsonRpcMessage, ProtocolMessage};

use crate::error::{Error, Result};
use crate::peripherals::{AudioCapture, AudioPlayback, KeywordDetector};
use crate::transport::{Transport, TransportEvent};

pub(crate) const TEST_SESSION: &str = "test-session";
const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Message(ProtocolMessage),
    Audio(Vec<u8>),
}

/// In-memory transport that records everything sent through it.
pub(crate) struct FakeTransport {
    session_id: Mutex<Option<String>>,
    connected: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
    sent_tx: mpsc::UnboundedSender<Sent>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Sent>>,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    silent_connect: AtomicBool,
}

impl FakeTransport {
    fn new(session_id: Option<&str>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            connected: AtomicBool::new(session_id.is_some()),
            session_id: Mutex::new(session_id.map(str::to_string)),
            events,
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
            connects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            silent_connect: AtomicBool::new(false),
        })
    }

    pub(crate) fn connected() -> Arc<Self> {
        Self::new(Some(TEST_SESSION))
    }

    pub(crate) fn disconnected() -> Arc<Self> {
        Self::new(None)
    }

    pub(crate) fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// `connect` succeeds but the server never says hello.
    pub(crate) fn set_silent_connect(&self, silent: bool) {
        self.silent_connect.store(silent, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Simulates the peer vanishing.
    pub(crate) fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.session_id.lock().unwrap() = None;
        self.emit(TransportEvent::Disconnected { unexpected: true });
    }

    pub(crate) async fn next_sent(&self) -> Sent {
        let mut rx = self.sent_rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("nothing was sent")
            .expect("sent channel closed")
    }

    pub(crate) async fn next_message(&self) -> ProtocolMessage {
        match self.next_sent().await {
            Sent::Message(message) => message,
            Sent::Audio(frame) => panic!("expected a message, got {} audio bytes", frame.len()),
        }
    }

    pub(crate) async fn next_mcp(&self) -> JsonRpcMessage {
        match self.next_message().await {
            ProtocolMessage::Mcp(mcp) => mcp.into_payload(),
            other => panic!("expected an mcp message, got {:?}", other),
        }
    }

    pub(crate) fn try_sent(&self) -> Option<Sent> {
        self.sent_rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::HandshakeFailed("connection refused".to_string()));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }
        if self.silent_connect.load(Ordering::SeqCst) {
            return Ok(());
        }
        *self.session_id.lock().unwrap() = Some(TEST_SESSION.to_string());
        self.emit(TransportEvent::Connected {
            session_id: TEST_SESSION.to_string(),
            mcp: false,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            *self.session_id.lock().unwrap() = None;
            self.emit(TransportEvent::Disconnected { unexpected: false });
        }
        Ok(())
    }

    async fn send(&self, message: ProtocolMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let _ = self.sent_tx.send(Sent::Message(message));
        Ok(())
    }

    async fn send_audio(&self, frame: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let _ = self.sent_tx.send(Sent::Audio(frame));
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().unwrap().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Shared call log for the recording peripherals, e.g. `["capture.start", "detector.stop"]`.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: &str) {
        self.0.lock().unwrap().push(call.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

pub(crate) struct FakeCapture {
    log: CallLog,
    fail: AtomicBool,
}

impl FakeCapture {
    pub(crate) fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            fail: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn start(&self, _sample_rate: u32, _channels: u16) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            self.log.push("capture.failed");
            return Err(Error::peripheral("capture device busy"));
        }
        self.log.push("capture.start");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.log.push("capture.stop");
        Ok(())
    }
}

pub(crate) struct FakePlayback {
    log: CallLog,
    played: Mutex<Vec<Vec<i16>>>,
}

impl FakePlayback {
    pub(crate) fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            played: Mutex::new(vec![]),
        })
    }

    pub(crate) fn played(&self) -> Vec<Vec<i16>> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioPlayback for FakePlayback {
    async fn play(&self, pcm: Vec<i16>) -> Result<()> {
        self.log.push("playback.play");
        self.played.lock().unwrap().push(pcm);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.log.push("playback.stop");
        Ok(())
    }
}

pub(crate) struct FakeDetector {
    log: CallLog,
}

impl FakeDetector {
    pub(crate) fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self { log })
    }
}

#[async_trait]
impl KeywordDetector for FakeDetector {
    async fn start(&self) -> Result<()> {
        self.log.push("detector.start");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.log.push("detector.stop");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.log.push("detector.pause");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.log.push("detector.resume");
        Ok(())
    }
}

/// Polls `check` until it holds, failing the test after a couple of seconds.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within {:?}", WAIT);
}
