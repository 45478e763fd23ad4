#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenState {
    Start,
    Stop,
    /// A wake word was spotted locally; `text` carries the word.
    Detect,
}

/// How the server decides the end of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningMode {
    /// Full duplex, the device keeps streaming while the assistant speaks.
    Realtime,
    /// The client stops listening explicitly.
    Manual,
    /// Server-side voice activity detection ends the turn.
    Auto,
}

/// `listen` message
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ListenMessage {
    session_id: String,

    state: ListenState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<ListeningMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl ListenMessage {
    pub fn start(session_id: &str, mode: ListeningMode) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: ListenState::Start,
            mode: Some(mode),
            text: None,
        }
    }

    pub fn stop(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: ListenState::Stop,
            mode: None,
            text: None,
        }
    }

    pub fn detect(session_id: &str, wake_word: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: ListenState::Detect,
            mode: None,
            text: Some(wake_word.to_string()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ListenState {
        self.state
    }

    pub fn mode(&self) -> Option<ListeningMode> {
        self.mode
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    Stop,
    SentenceStart,
    SentenceEnd,
}

/// `tts` message: lifecycle of synthesized speech on the server.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TtsMessage {
    #[serde(default)]
    session_id: String,

    state: TtsState,

    /// Sentence text, present on `sentence_start`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl TtsMessage {
    pub fn new(session_id: &str, state: TtsState) -> Self {
        Self {
            session_id: session_id.to_string(),
            state,
            text: None,
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> TtsState {
        self.state
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// `stt` message: recognized user speech.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SttMessage {
    #[serde(default)]
    session_id: String,

    text: String,
}

impl SttMessage {
    pub fn new(session_id: &str, text: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            text: text.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `llm` message: emotion hint accompanying the assistant's reply.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LlmMessage {
    #[serde(default)]
    session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    emotion: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl LlmMessage {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            emotion: None,
            text: None,
        }
    }

    pub fn with_emotion(mut self, emotion: &str) -> Self {
        self.emotion = Some(emotion.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emotion(&self) -> Option<&str> {
        self.emotion.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    WakeWordDetected,
    UserInterruption,
}

/// `abort` message: stop the assistant's current reply.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AbortMessage {
    session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<AbortReason>,
}

impl AbortMessage {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: AbortReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason
    }
}
