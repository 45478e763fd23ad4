use voicelink_types::codec::EncodeError;
use voicelink_types::RequestId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport is already connected")]
    AlreadyConnected,
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("request {id} timed out")]
    RequestTimeout { id: RequestId },
    #[error("connection lost")]
    ConnectionLost,
    #[error("tool-invocation session is not initialized")]
    NotInitialized,
    #[error("remote returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("peripheral failure: {0}")]
    Peripheral(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
}

impl Error {
    pub fn peripheral(message: impl std::fmt::Display) -> Self {
        Error::Peripheral(message.to_string())
    }
}
