use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use voicelink_types::codec;
use voicelink_types::events::{Features, GoodbyeMessage, HelloMessage};
use voicelink_types::ProtocolMessage;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

mod config;
mod consts;
mod stats;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

type EventTx = broadcast::Sender<TransportEvent>;
pub type EventRx = broadcast::Receiver<TransportEvent>;

/// The live half of a connection: the outbound frame queue feeding the
/// writer task and the token that stops the reader and the watchdog.
struct Link {
    outgoing: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Link {
    fn close(self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct SessionState {
    link: Option<Link>,
    session_id: Option<String>,
    peer_mcp: bool,
    // Bumped on every connect so that tasks of an old connection cannot
    // tear down a newer one.
    generation: u64,
}

struct Shared {
    state: Mutex<SessionState>,
    events: EventTx,
    stats: Mutex<Stats>,
}

/// What the reader does after handling one text frame.
#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Goodbye,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("no transport event subscribers");
        }
    }

    fn outgoing(&self) -> Option<mpsc::Sender<Message>> {
        self.state().link.as_ref().map(|link| link.outgoing.clone())
    }

    /// Drops the link of `generation` if it is still current. Returns false
    /// when someone else (disconnect, watchdog, a newer connect) got there first.
    fn release(&self, generation: u64) -> bool {
        let link = {
            let mut state = self.state();
            if state.generation != generation {
                return false;
            }
            state.session_id = None;
            state.peer_mcp = false;
            state.link.take()
        };
        match link {
            Some(link) => {
                link.close();
                true
            }
            None => false,
        }
    }

    fn handshake_pending(&self, generation: u64) -> bool {
        let state = self.state();
        state.generation == generation && state.link.is_some() && state.session_id.is_none()
    }

    fn handle_text(&self, generation: u64, text: &str) -> Flow {
        self.stats().record_text_in();

        match codec::decode(text) {
            Ok(ProtocolMessage::Hello(hello)) => {
                let Some(session_id) = hello.session_id() else {
                    tracing::warn!("server hello without session id, ignoring");
                    return Flow::Continue;
                };
                let mcp = hello.supports_mcp();
                {
                    let mut state = self.state();
                    if state.generation != generation {
                        return Flow::Continue;
                    }
                    state.session_id = Some(session_id.to_string());
                    state.peer_mcp = mcp;
                }
                tracing::info!("session established: id={}, mcp={}", session_id, mcp);
                self.emit(TransportEvent::Connected {
                    session_id: session_id.to_string(),
                    mcp,
                });
                Flow::Continue
            }
            Ok(ProtocolMessage::Goodbye(goodbye)) => {
                tracing::info!("server said goodbye: session={}", goodbye.session_id());
                Flow::Goodbye
            }
            Ok(ProtocolMessage::Unrecognized { kind }) => {
                tracing::debug!("ignoring message of unknown type: {}", kind);
                self.stats().record_dropped();
                Flow::Continue
            }
            Ok(message) => {
                tracing::debug!("received message: {}", message.kind());
                self.emit(TransportEvent::Message(message));
                Flow::Continue
            }
            Err(e) => {
                tracing::warn!("dropping undecodable frame: {}", e);
                self.stats().record_dropped();
                Flow::Continue
            }
        }
    }
}

/// Transport session over a websocket.
pub struct Client {
    config: Config,
    shared: Arc<Shared>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        let (events, _) = broadcast::channel(config.capacity());
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::default()),
                events,
                stats: Mutex::new(Stats::new()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.shared.stats().clone()
    }

    /// Whether the server's hello declared tool-invocation support.
    pub fn peer_supports_mcp(&self) -> bool {
        self.shared.state().peer_mcp
    }

    async fn send_frame(&self, frame: Message) -> Result<()> {
        let outgoing = self.shared.outgoing().ok_or(Error::NotConnected)?;
        outgoing.send(frame).await.map_err(|_| Error::NotConnected)
    }

    fn spawn_writer(
        &self,
        mut write: impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send + 'static,
        mut outgoing: mpsc::Receiver<Message>,
    ) {
        tokio::spawn(async move {
            while let Some(frame) = outgoing.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = write.send(frame).await {
                    tracing::error!("failed to send frame: {}", e);
                    break;
                }
                if closing {
                    return;
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close websocket: {}", e);
            }
        });
    }

    fn spawn_reader(
        &self,
        mut read: impl futures_util::Stream<Item = tokio_tungstenite::tungstenite::Result<Message>> + Unpin + Send + 'static,
        cancel: CancellationToken,
        generation: u64,
    ) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut goodbye = false;
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = read.next() => frame,
                };
                let message = match frame {
                    None => break,
                    Some(Err(e)) => {
                        tracing::error!("failed to read frame: {}", e);
                        break;
                    }
                    Some(Ok(message)) => message,
                };
                match message {
                    Message::Text(text) => {
                        if shared.handle_text(generation, &text) == Flow::Goodbye {
                            goodbye = true;
                            break;
                        }
                    }
                    Message::Binary(frame) => {
                        shared.stats().record_audio_in();
                        shared.emit(TransportEvent::Audio(frame));
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }

            if shared.release(generation) {
                if !goodbye {
                    tracing::warn!("connection lost");
                }
                shared.emit(TransportEvent::Disconnected { unexpected: !goodbye });
            }
        });
    }

    fn spawn_handshake_watchdog(&self, cancel: CancellationToken, generation: u64) {
        let shared = self.shared.clone();
        let timeout = self.config.handshake_timeout();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if shared.handshake_pending(generation) && shared.release(generation) {
                        tracing::warn!("no server hello within {:?}", timeout);
                        shared.emit(TransportEvent::HandshakeFailed {
                            reason: format!("no server hello within {:?}", timeout),
                        });
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Transport for Client {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio::time::timeout(
            self.config.connect_timeout(),
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| Error::HandshakeFailed(format!("connect timed out after {:?}", self.config.connect_timeout())))??;

        let (write, read) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(self.config.capacity());
        let cancel = CancellationToken::new();

        let generation = {
            let mut state = self.shared.state();
            if state.link.is_some() {
                return Err(Error::AlreadyConnected);
            }
            state.generation += 1;
            state.session_id = None;
            state.peer_mcp = false;
            state.link = Some(Link {
                outgoing: outgoing_tx,
                cancel: cancel.clone(),
            });
            state.generation
        };

        self.spawn_writer(write, outgoing_rx);
        self.spawn_reader(read, cancel.clone(), generation);
        self.spawn_handshake_watchdog(cancel, generation);

        let hello = HelloMessage::new(self.config.protocol_version(), self.config.audio_params().clone())
            .with_features(Features::new().with_mcp(true));
        tracing::info!("connected to {}, sending hello", self.config.url());
        self.send(ProtocolMessage::Hello(hello)).await
    }

    async fn disconnect(&self) -> Result<()> {
        let (link, session_id) = {
            let mut state = self.shared.state();
            state.peer_mcp = false;
            (state.link.take(), state.session_id.take())
        };
        let Some(link) = link else {
            tracing::debug!("disconnect requested while not connected");
            return Ok(());
        };

        if let Some(session_id) = session_id {
            let goodbye = ProtocolMessage::Goodbye(GoodbyeMessage::new(&session_id));
            match codec::encode(&goodbye) {
                Ok(text) => {
                    if link.outgoing.send(Message::Text(text)).await.is_err() {
                        tracing::debug!("goodbye not delivered, writer already gone");
                    } else {
                        self.shared.stats().record_text_out();
                    }
                }
                Err(e) => tracing::error!("failed to encode goodbye: {}", e),
            }
        }
        if link.outgoing.send(Message::Close(None)).await.is_err() {
            tracing::debug!("close frame not delivered, writer already gone");
        }
        link.close();

        tracing::info!("disconnected");
        self.shared.emit(TransportEvent::Disconnected { unexpected: false });
        Ok(())
    }

    async fn send(&self, message: ProtocolMessage) -> Result<()> {
        let text = codec::encode(&message)?;
        tracing::debug!("sending message: {}", message.kind());
        self.send_frame(Message::Text(text)).await?;
        self.shared.stats().record_text_out();
        Ok(())
    }

    async fn send_audio(&self, frame: Vec<u8>) -> Result<()> {
        self.send_frame(Message::Binary(frame)).await?;
        self.shared.stats().record_audio_out();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.shared.state().session_id.clone()
    }

    fn is_connected(&self) -> bool {
        self.shared.state().link.is_some()
    }

    fn subscribe(&self) -> EventRx {
        self.shared.events.subscribe()
    }
}
