//! Drives one conversation: feeds transport, device and timer events into
//! the [`StateMachine`] and runs the side effects of every transition it
//! applies.
//!
//! Four tasks share the orchestrator state:
//!
//! * effects: applies exit/entry actions, one transition at a time, in order;
//! * transport: connectivity, control messages and inbound audio;
//! * device: captured frames, playback completion, wake words, hotkeys;
//! * playback: decodes and plays inbound audio off the transport task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use voicelink_types::events::{
    AbortMessage, AbortReason, ListenMessage, ListeningMode, TtsMessage, TtsState,
};
use voicelink_types::{JsonRpcMessage, ProtocolMessage};

use crate::error::Result;
use crate::mcp::{InboundOutcome, McpConfig, McpCorrelator, ToolRegistry};
use crate::peripherals::{AudioCapture, AudioCodec, AudioPlayback, DeviceEvent, KeywordDetector};
use crate::state_machine::{ConversationTrigger, DeviceState, StateMachine, StateTransition};
use crate::transport::{Transport, TransportEvent};

pub const DEFAULT_RELISTEN_DELAY: Duration = Duration::ZERO;
pub const DEFAULT_PLAYBACK_QUEUE: usize = 128;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    sample_rate: u32,
    channels: u16,
    realtime: bool,
    relisten_delay: Duration,
    playback_queue: usize,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self {
            sample_rate: voicelink_types::audio::DEFAULT_SAMPLE_RATE,
            channels: voicelink_types::audio::DEFAULT_CHANNELS,
            realtime: false,
            relisten_delay: DEFAULT_RELISTEN_DELAY,
            playback_queue: DEFAULT_PLAYBACK_QUEUE,
        }
    }

    pub fn with_capture_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// Continuous conversations use `realtime` listening instead of `auto`.
    /// Needs echo cancellation on the device.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Pause between the end of an answer and listening again in continuous mode.
    pub fn with_relisten_delay(mut self, delay: Duration) -> Self {
        self.relisten_delay = delay;
        self
    }

    /// Inbound audio frames held while playback catches up. Frames beyond
    /// this are dropped.
    pub fn with_playback_queue(mut self, frames: usize) -> Self {
        self.playback_queue = frames.max(1);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn realtime(&self) -> bool {
        self.realtime
    }

    pub fn relisten_delay(&self) -> Duration {
        self.relisten_delay
    }

    pub fn playback_queue(&self) -> usize {
        self.playback_queue
    }

    fn listening_mode(&self, keep_listening: bool) -> ListeningMode {
        match (keep_listening, self.realtime) {
            (false, _) => ListeningMode::Manual,
            (true, true) => ListeningMode::Realtime,
            (true, false) => ListeningMode::Auto,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the orchestrator publishes besides raw transitions.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    StateChanged(StateTransition),
    /// Recognized user speech.
    Transcript(String),
    /// Text of the sentence the assistant is about to speak.
    AssistantText(String),
    Emotion(String),
    /// An MCP notification or a response nobody waited for.
    McpNotification(JsonRpcMessage),
    /// The remote tool catalog was fetched; carries its size.
    ToolsReady(usize),
}

/// The device-side collaborators.
#[derive(Clone)]
pub struct Peripherals {
    pub capture: Arc<dyn AudioCapture>,
    pub playback: Arc<dyn AudioPlayback>,
    pub codec: Arc<dyn AudioCodec>,
    pub detector: Arc<dyn KeywordDetector>,
}

/// A conversation start deferred until the session is up.
#[derive(Debug, Clone, PartialEq)]
enum PendingStart {
    Conversation,
    WakeWord(String),
}

/// Receivers taken by [`Orchestrator::start`].
struct Feeds {
    transitions: mpsc::UnboundedReceiver<StateTransition>,
    transport: broadcast::Receiver<TransportEvent>,
    device: mpsc::UnboundedReceiver<DeviceEvent>,
    audio: mpsc::Receiver<Vec<u8>>,
}

struct Inner {
    config: OrchestratorConfig,
    machine: StateMachine,
    transport: Arc<dyn Transport>,
    mcp: Arc<McpCorrelator>,
    peripherals: Peripherals,
    keep_listening: AtomicBool,
    was_connected: AtomicBool,
    pending_start: Mutex<Option<PendingStart>>,
    relisten: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<OrchestratorEvent>,
    device_tx: mpsc::UnboundedSender<DeviceEvent>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    feeds: Mutex<Option<Feeds>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        tools: ToolRegistry,
        peripherals: Peripherals,
        config: OrchestratorConfig,
        mcp_config: McpConfig,
    ) -> Self {
        let machine = StateMachine::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (device_tx, device) = mpsc::unbounded_channel();
        let (audio_tx, audio) = mpsc::channel(config.playback_queue);
        // subscribe before anything can happen so no event is missed
        let feeds = Feeds {
            transitions: machine.subscribe(),
            transport: transport.subscribe(),
            device,
            audio,
        };
        let mcp = Arc::new(McpCorrelator::new(transport.clone(), tools, mcp_config));

        Self {
            inner: Arc::new(Inner {
                config,
                machine,
                transport,
                mcp,
                peripherals,
                keep_listening: AtomicBool::new(false),
                was_connected: AtomicBool::new(false),
                pending_start: Mutex::new(None),
                relisten: Mutex::new(None),
                events,
                device_tx,
                audio_tx,
                feeds: Mutex::new(Some(feeds)),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Starts wake-word detection and the background tasks. Calling it again is a no-op.
    pub async fn start(&self) -> Result<()> {
        let Some(feeds) = lock(&self.inner.feeds).take() else {
            return Ok(());
        };
        let inner = &self.inner;
        inner
            .was_connected
            .store(inner.transport.is_connected(), Ordering::SeqCst);
        inner.peripherals.detector.start().await?;

        inner.tasks.spawn(inner.clone().run_effects(feeds.transitions));
        inner.tasks.spawn(inner.clone().run_transport(feeds.transport));
        inner.tasks.spawn(inner.clone().run_device(feeds.device));
        inner.tasks.spawn(inner.clone().run_playback(feeds.audio));
        tracing::info!("orchestrator started in state {}", inner.machine.current());
        Ok(())
    }

    /// Requests a connection to the server.
    pub fn connect(&self) -> bool {
        self.inner
            .machine
            .request_transition(ConversationTrigger::ConnectToServer, Some("connect requested"))
    }

    /// Starts listening. With `keep_listening` the device listens again after
    /// every answer until stopped. Connects first when needed.
    pub fn start_conversation(&self, keep_listening: bool) -> bool {
        let inner = &self.inner;
        inner.cancel_relisten();
        inner.keep_listening.store(keep_listening, Ordering::SeqCst);
        if !inner.transport.is_connected() {
            return inner.connect_then(PendingStart::Conversation);
        }
        inner
            .machine
            .request_transition(ConversationTrigger::StartVoiceChat, None)
    }

    pub fn stop_conversation(&self) -> bool {
        let inner = &self.inner;
        inner.keep_listening.store(false, Ordering::SeqCst);
        inner.cancel_relisten();
        lock(&inner.pending_start).take();
        inner
            .machine
            .request_transition(ConversationTrigger::StopVoiceChat, None)
    }

    /// Cuts the assistant off: sends `abort`, then requests `UserInterrupt`.
    pub async fn interrupt(&self) -> bool {
        self.inner.interrupt(AbortReason::UserInterruption).await
    }

    /// Start in continuous mode, stop, or interrupt, depending on the state.
    pub async fn toggle_conversation(&self) -> bool {
        match self.state() {
            DeviceState::Idle => self.start_conversation(true),
            DeviceState::Listening => self.stop_conversation(),
            DeviceState::Speaking => self.interrupt().await,
            DeviceState::Connecting => false,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.inner.machine.current()
    }

    /// Every transition from now on, in the order applied.
    pub fn subscribe_state(&self) -> mpsc::UnboundedReceiver<StateTransition> {
        self.inner.machine.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    /// Where capture, playback, the keyword detector and hotkeys report.
    pub fn device_events(&self) -> mpsc::UnboundedSender<DeviceEvent> {
        self.inner.device_tx.clone()
    }

    pub fn mcp(&self) -> Arc<McpCorrelator> {
        self.inner.mcp.clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    /// Stops every task, closes the session and fails pending tool calls.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.cancel_relisten();
        inner.cancel.cancel();
        inner.tasks.close();
        inner.tasks.wait().await;

        if let Err(e) = inner.transport.disconnect().await {
            tracing::warn!("disconnect during shutdown failed: {}", e);
        }
        inner.mcp.fail_all();
        let peripherals = &inner.peripherals;
        for (name, outcome) in [
            ("capture", peripherals.capture.stop().await),
            ("playback", peripherals.playback.stop().await),
            ("keyword detector", peripherals.detector.stop().await),
        ] {
            if let Err(e) = outcome {
                tracing::warn!("failed to stop {}: {}", name, e);
            }
        }
        tracing::info!("orchestrator stopped");
    }
}

impl Inner {
    fn publish(&self, event: OrchestratorEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("no orchestrator event subscribers");
        }
    }

    fn session_id(&self) -> String {
        self.transport.session_id().unwrap_or_default()
    }

    fn request(&self, trigger: ConversationTrigger, context: Option<&str>) -> bool {
        self.machine.request_transition(trigger, context)
    }

    /// Remembers `start` and asks for a connection; the start is replayed
    /// once the server has answered.
    fn connect_then(&self, start: PendingStart) -> bool {
        *lock(&self.pending_start) = Some(start);
        match self.machine.current() {
            DeviceState::Connecting => true,
            _ => self.request(ConversationTrigger::ConnectToServer, Some("start while disconnected")),
        }
    }

    fn cancel_relisten(&self) {
        if let Some(token) = lock(&self.relisten).take() {
            token.cancel();
        }
    }

    fn schedule_relisten(self: &Arc<Self>) {
        let token = self.cancel.child_token();
        if let Some(previous) = lock(&self.relisten).replace(token.clone()) {
            previous.cancel();
        }
        let this = self.clone();
        let delay = self.config.relisten_delay;
        self.tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if this.keep_listening.load(Ordering::SeqCst) {
                        this.request(ConversationTrigger::StartVoiceChat, Some("continuous listening"));
                    }
                }
            }
        });
    }

    async fn interrupt(&self, reason: AbortReason) -> bool {
        if reason == AbortReason::UserInterruption {
            self.keep_listening.store(false, Ordering::SeqCst);
            self.cancel_relisten();
        }
        if self.transport.is_connected() {
            let abort = AbortMessage::new(&self.session_id()).with_reason(reason);
            if let Err(e) = self.transport.send(ProtocolMessage::Abort(abort)).await {
                tracing::warn!("failed to send abort: {}", e);
            }
        }
        let trigger = match reason {
            AbortReason::UserInterruption => ConversationTrigger::UserInterrupt,
            AbortReason::WakeWordDetected => ConversationTrigger::KeywordDetected,
        };
        self.request(trigger, Some("interrupted"))
    }

    async fn on_keyword(&self, wake_word: String) {
        match self.machine.current() {
            DeviceState::Idle => {
                self.keep_listening.store(true, Ordering::SeqCst);
                if !self.transport.is_connected() {
                    self.connect_then(PendingStart::WakeWord(wake_word));
                    return;
                }
                let detect = ListenMessage::detect(&self.session_id(), &wake_word);
                if let Err(e) = self.transport.send(ProtocolMessage::Listen(detect)).await {
                    tracing::warn!("failed to report wake word: {}", e);
                }
                self.request(ConversationTrigger::KeywordDetected, Some(&wake_word));
            }
            DeviceState::Listening => {
                // probably our own voice; kept equivalent to Idle, the table rejects it
                self.keep_listening.store(true, Ordering::SeqCst);
                self.request(ConversationTrigger::KeywordDetected, Some(&wake_word));
            }
            DeviceState::Speaking => {
                self.keep_listening.store(true, Ordering::SeqCst);
                self.interrupt(AbortReason::WakeWordDetected).await;
            }
            DeviceState::Connecting => {
                tracing::debug!("wake word {:?} ignored while connecting", wake_word);
            }
        }
    }

    async fn replay_pending_start(&self) {
        let pending = lock(&self.pending_start).take();
        match pending {
            Some(PendingStart::Conversation) => {
                self.request(ConversationTrigger::StartVoiceChat, Some("after connect"));
            }
            Some(PendingStart::WakeWord(wake_word)) => self.on_keyword(wake_word).await,
            None => {}
        }
    }

    async fn run_effects(self: Arc<Self>, mut transitions: mpsc::UnboundedReceiver<StateTransition>) {
        loop {
            let transition = tokio::select! {
                _ = self.cancel.cancelled() => break,
                transition = transitions.recv() => match transition {
                    Some(transition) => transition,
                    None => break,
                },
            };
            self.publish(OrchestratorEvent::StateChanged(transition.clone()));
            self.on_exit(transition.from_state()).await;
            self.on_enter(&transition).await;
        }
    }

    async fn on_exit(&self, state: DeviceState) {
        match state {
            DeviceState::Listening => {
                if self.transport.is_connected() {
                    let stop = ListenMessage::stop(&self.session_id());
                    if let Err(e) = self.transport.send(ProtocolMessage::Listen(stop)).await {
                        tracing::warn!("failed to send listen stop: {}", e);
                    }
                }
                if let Err(e) = self.peripherals.capture.stop().await {
                    tracing::warn!("failed to stop capture: {}", e);
                }
            }
            DeviceState::Speaking => {
                if let Err(e) = self.peripherals.playback.stop().await {
                    tracing::warn!("failed to stop playback: {}", e);
                }
            }
            DeviceState::Idle | DeviceState::Connecting => {}
        }
    }

    async fn on_enter(self: &Arc<Self>, transition: &StateTransition) {
        if transition.to_state() != DeviceState::Idle {
            self.cancel_relisten();
        }
        match transition.to_state() {
            DeviceState::Listening => {
                if let Err(e) = self.start_listening().await {
                    tracing::error!("failed to start listening: {}", e);
                    self.request(ConversationTrigger::ForceIdle, Some("listening failed"));
                }
            }
            DeviceState::Speaking => {}
            DeviceState::Idle => {
                let detector = &self.peripherals.detector;
                if let Err(e) = detector.stop().await {
                    tracing::warn!("failed to stop keyword detector: {}", e);
                }
                if let Err(e) = detector.start().await {
                    tracing::error!("failed to restart keyword detector: {}", e);
                }
                let answered = matches!(
                    transition.trigger(),
                    ConversationTrigger::TtsCompleted
                        | ConversationTrigger::AudioPlaybackCompleted
                        | ConversationTrigger::KeywordDetected
                );
                if transition.from_state() == DeviceState::Speaking
                    && answered
                    && self.keep_listening.load(Ordering::SeqCst)
                {
                    self.schedule_relisten();
                }
            }
            DeviceState::Connecting => match self.transport.connect().await {
                Ok(()) => {}
                Err(crate::Error::AlreadyConnected) => {
                    self.request(ConversationTrigger::ServerConnected, Some("already connected"));
                }
                Err(e) => {
                    tracing::error!("failed to connect: {}", e);
                    lock(&self.pending_start).take();
                    self.request(ConversationTrigger::ConnectionFailed, Some(&e.to_string()));
                }
            },
        }
    }

    async fn start_listening(&self) -> Result<()> {
        let mode = self
            .config
            .listening_mode(self.keep_listening.load(Ordering::SeqCst));
        let start = ListenMessage::start(&self.session_id(), mode);
        self.transport.send(ProtocolMessage::Listen(start)).await?;
        self.peripherals
            .capture
            .start(self.config.sample_rate, self.config.channels)
            .await
    }

    async fn run_transport(self: Arc<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("orchestrator missed {} transport events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            self.on_transport_event(event).await;
        }
    }

    async fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected { session_id, mcp } => {
                self.was_connected.store(true, Ordering::SeqCst);
                self.request(ConversationTrigger::ServerConnected, Some(&session_id));
                if mcp {
                    self.initialize_mcp();
                }
                if self.machine.current() == DeviceState::Idle {
                    self.replay_pending_start().await;
                }
            }
            TransportEvent::HandshakeFailed { reason } => {
                lock(&self.pending_start).take();
                self.mcp.fail_all();
                self.request(ConversationTrigger::ConnectionFailed, Some(&reason));
            }
            TransportEvent::Disconnected { unexpected } => {
                self.cancel_relisten();
                self.mcp.fail_all();
                let was_connected = self.was_connected.swap(false, Ordering::SeqCst);
                if unexpected && self.machine.current() == DeviceState::Connecting {
                    // lost before the server hello; nothing will retry on its own
                    lock(&self.pending_start).take();
                    self.request(ConversationTrigger::ConnectionFailed, Some("connection lost during handshake"));
                } else if unexpected {
                    if was_connected {
                        if let Err(e) = self.transport.disconnect().await {
                            tracing::debug!("cleanup after connection loss failed: {}", e);
                        }
                    }
                    self.request(ConversationTrigger::ServerDisconnected, Some("connection lost"));
                } else {
                    lock(&self.pending_start).take();
                    self.request(ConversationTrigger::ForceIdle, Some("session closed"));
                }
            }
            TransportEvent::Audio(frame) => {
                if self.machine.current() != DeviceState::Speaking {
                    self.request(ConversationTrigger::AudioReceived, None);
                }
                if self.machine.current() == DeviceState::Speaking {
                    match self.audio_tx.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(frame)) => {
                            tracing::warn!("playback queue full, dropping {} audio bytes", frame.len());
                        }
                        Err(TrySendError::Closed(_)) => tracing::debug!("playback task is gone"),
                    }
                } else {
                    tracing::trace!("dropping {} audio bytes in state {}", frame.len(), self.machine.current());
                }
            }
            TransportEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_message(self: &Arc<Self>, message: ProtocolMessage) {
        match message {
            ProtocolMessage::Tts(tts) => self.on_tts(tts),
            ProtocolMessage::Stt(stt) => {
                tracing::info!(">> {}", stt.text());
                self.publish(OrchestratorEvent::Transcript(stt.text().to_string()));
            }
            ProtocolMessage::Llm(llm) => {
                if let Some(emotion) = llm.emotion() {
                    self.publish(OrchestratorEvent::Emotion(emotion.to_string()));
                }
            }
            ProtocolMessage::Mcp(mcp) => {
                if let InboundOutcome::Informational(payload) = self.mcp.handle_inbound(mcp.into_payload()) {
                    self.publish(OrchestratorEvent::McpNotification(payload));
                }
            }
            other => tracing::debug!("ignoring inbound {} message", other.kind()),
        }
    }

    fn on_tts(&self, tts: TtsMessage) {
        match tts.state() {
            TtsState::Start => {
                self.request(ConversationTrigger::TtsStarted, None);
            }
            TtsState::Stop => {
                self.request(ConversationTrigger::TtsCompleted, None);
            }
            TtsState::SentenceStart => {
                if let Some(text) = tts.text() {
                    tracing::info!("<< {}", text);
                    self.publish(OrchestratorEvent::AssistantText(text.to_string()));
                }
            }
            TtsState::SentenceEnd => {}
        }
    }

    fn initialize_mcp(self: &Arc<Self>) {
        let this = self.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = this.cancel.cancelled() => {}
                outcome = this.mcp.initialize() => match outcome {
                    Ok(()) => this.publish(OrchestratorEvent::ToolsReady(this.mcp.list_tools().len())),
                    Err(e) => tracing::warn!("mcp initialization failed: {}", e),
                },
            }
        });
    }

    async fn run_device(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<DeviceEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                DeviceEvent::CapturedFrame(pcm) => self.send_captured(&pcm).await,
                DeviceEvent::PlaybackCompleted => {
                    self.request(ConversationTrigger::AudioPlaybackCompleted, None);
                }
                DeviceEvent::KeywordDetected(wake_word) => self.on_keyword(wake_word).await,
                DeviceEvent::ManualInterrupt => {
                    self.interrupt(AbortReason::UserInterruption).await;
                }
            }
        }
    }

    async fn send_captured(&self, pcm: &[i16]) {
        if self.machine.current() != DeviceState::Listening {
            return;
        }
        let frame = match self.peripherals.codec.encode(pcm) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("failed to encode captured audio: {}", e);
                return;
            }
        };
        if let Err(e) = self.transport.send_audio(frame).await {
            tracing::debug!("captured frame not sent: {}", e);
        }
    }

    async fn run_playback(self: Arc<Self>, mut frames: mpsc::Receiver<Vec<u8>>) {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            // frames queued before an interrupt are dropped
            if self.machine.current() != DeviceState::Speaking {
                continue;
            }
            let pcm = match self.peripherals.codec.decode(&frame) {
                Ok(pcm) => pcm,
                Err(e) => {
                    tracing::warn!("failed to decode inbound audio: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.peripherals.playback.play(pcm).await {
                tracing::warn!("playback failed: {}", e);
            }
        }
    }
}
