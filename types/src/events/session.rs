use crate::audio::AudioParams;

pub const PROTOCOL_VERSION: u32 = 1;
pub const TRANSPORT_WEBSOCKET: &str = "websocket";

/// Capability flags declared during the handshake.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Features {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mcp: Option<bool>,

    /// Acoustic echo cancellation on the device side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aec: Option<bool>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mcp(mut self, enabled: bool) -> Self {
        self.mcp = Some(enabled);
        self
    }

    pub fn with_aec(mut self, enabled: bool) -> Self {
        self.aec = Some(enabled);
        self
    }

    pub fn mcp(&self) -> bool {
        self.mcp.unwrap_or(false)
    }

    pub fn aec(&self) -> bool {
        self.aec.unwrap_or(false)
    }
}

/// `hello` message. Sent by the client after the socket opens; the server
/// answers with its own hello carrying the session id.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HelloMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    transport: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<Features>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_params: Option<AudioParams>,
}

impl HelloMessage {
    pub fn new(version: u32, audio_params: AudioParams) -> Self {
        Self {
            session_id: None,
            version: Some(version),
            transport: Some(TRANSPORT_WEBSOCKET.to_string()),
            features: None,
            audio_params: Some(audio_params),
        }
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = Some(features);
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    pub fn features(&self) -> Option<&Features> {
        self.features.as_ref()
    }

    pub fn audio_params(&self) -> Option<&AudioParams> {
        self.audio_params.as_ref()
    }

    /// Whether the sender declared tool-invocation support.
    pub fn supports_mcp(&self) -> bool {
        self.features.as_ref().map(Features::mcp).unwrap_or(false)
    }
}

/// `goodbye` message
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GoodbyeMessage {
    #[serde(default)]
    session_id: String,
}

impl GoodbyeMessage {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
