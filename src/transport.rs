use async_trait::async_trait;
use tokio::sync::broadcast;
use voicelink_types::ProtocolMessage;

use crate::error::Result;

/// Everything a session reports to its subscribers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The server answered our hello; the session id is now set.
    Connected { session_id: String, mcp: bool },
    /// No usable server hello arrived in time. The connection was closed.
    HandshakeFailed { reason: String },
    /// A decoded control message other than hello/goodbye.
    Message(ProtocolMessage),
    /// One compressed audio frame.
    Audio(Vec<u8>),
    /// The connection is gone. `unexpected` is false after `disconnect()` or a server goodbye.
    Disconnected { unexpected: bool },
}

/// One duplex connection to the assistant backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the connection and sends the client hello without waiting for the reply.
    async fn connect(&self) -> Result<()>;

    /// Says goodbye when a session is held, then closes.
    async fn disconnect(&self) -> Result<()>;

    async fn send(&self, message: ProtocolMessage) -> Result<()>;

    async fn send_audio(&self, frame: Vec<u8>) -> Result<()>;

    fn session_id(&self) -> Option<String>;

    fn is_connected(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
