mod conversation;
mod mcp;
mod session;

pub use conversation::*;
pub use mcp::McpMessage;
pub use session::*;

/// Every control message exchanged as a JSON text frame.
///
/// Binary frames carry audio and never pass through this type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    #[serde(rename = "hello")]
    Hello(HelloMessage),
    #[serde(rename = "goodbye")]
    Goodbye(GoodbyeMessage),
    #[serde(rename = "listen")]
    Listen(ListenMessage),
    #[serde(rename = "tts")]
    Tts(TtsMessage),
    #[serde(rename = "stt")]
    Stt(SttMessage),
    #[serde(rename = "llm")]
    Llm(LlmMessage),
    #[serde(rename = "abort")]
    Abort(AbortMessage),
    #[serde(rename = "mcp")]
    Mcp(McpMessage),
    /// A well-formed frame whose `type` this client does not know.
    #[serde(skip)]
    Unrecognized { kind: String },
}

impl ProtocolMessage {
    /// Discriminators with a concrete variant.
    pub const KINDS: &'static [&'static str] =
        &["hello", "goodbye", "listen", "tts", "stt", "llm", "abort", "mcp"];

    pub fn kind(&self) -> &str {
        match self {
            ProtocolMessage::Hello(_) => "hello",
            ProtocolMessage::Goodbye(_) => "goodbye",
            ProtocolMessage::Listen(_) => "listen",
            ProtocolMessage::Tts(_) => "tts",
            ProtocolMessage::Stt(_) => "stt",
            ProtocolMessage::Llm(_) => "llm",
            ProtocolMessage::Abort(_) => "abort",
            ProtocolMessage::Mcp(_) => "mcp",
            ProtocolMessage::Unrecognized { kind } => kind,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            ProtocolMessage::Hello(m) => m.session_id(),
            ProtocolMessage::Goodbye(m) => Some(m.session_id()),
            ProtocolMessage::Listen(m) => Some(m.session_id()),
            ProtocolMessage::Tts(m) => Some(m.session_id()),
            ProtocolMessage::Stt(m) => Some(m.session_id()),
            ProtocolMessage::Llm(m) => Some(m.session_id()),
            ProtocolMessage::Abort(m) => Some(m.session_id()),
            ProtocolMessage::Mcp(m) => Some(m.session_id()),
            ProtocolMessage::Unrecognized { .. } => None,
        }
    }
}
