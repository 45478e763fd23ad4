//! Conversation lifecycle.
//!
//! [`next_state`] is the whole transition table and does no I/O.
//! [`StateMachine`] owns the current [`DeviceState`], applies triggers under
//! one mutex and hands every accepted [`StateTransition`] to its subscribers
//! in the order it was applied.

use std::sync::Mutex;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Idle,
    Connecting,
    Listening,
    Speaking,
}

impl DeviceState {
    pub const ALL: [DeviceState; 4] = [
        DeviceState::Idle,
        DeviceState::Connecting,
        DeviceState::Listening,
        DeviceState::Speaking,
    ];
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::Idle
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceState::Idle => "idle",
            DeviceState::Connecting => "connecting",
            DeviceState::Listening => "listening",
            DeviceState::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationTrigger {
    StartVoiceChat,
    StopVoiceChat,
    KeywordDetected,
    TtsStarted,
    TtsCompleted,
    AudioReceived,
    AudioPlaybackCompleted,
    UserInterrupt,
    ConnectToServer,
    ServerConnected,
    ServerDisconnected,
    ConnectionFailed,
    ForceIdle,
}

impl ConversationTrigger {
    pub const ALL: [ConversationTrigger; 13] = [
        ConversationTrigger::StartVoiceChat,
        ConversationTrigger::StopVoiceChat,
        ConversationTrigger::KeywordDetected,
        ConversationTrigger::TtsStarted,
        ConversationTrigger::TtsCompleted,
        ConversationTrigger::AudioReceived,
        ConversationTrigger::AudioPlaybackCompleted,
        ConversationTrigger::UserInterrupt,
        ConversationTrigger::ConnectToServer,
        ConversationTrigger::ServerConnected,
        ConversationTrigger::ServerDisconnected,
        ConversationTrigger::ConnectionFailed,
        ConversationTrigger::ForceIdle,
    ];
}

/// One accepted state change.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateTransition {
    from: DeviceState,
    to: DeviceState,
    trigger: ConversationTrigger,
    context: Option<String>,
    timestamp: DateTime<Utc>,
}

impl StateTransition {
    pub fn from_state(&self) -> DeviceState {
        self.from
    }

    pub fn to_state(&self) -> DeviceState {
        self.to
    }

    pub fn trigger(&self) -> ConversationTrigger {
        self.trigger
    }

    /// Free text supplied with the trigger, for diagnostics only.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// The transition table. `None` means the trigger is not accepted in `current`.
pub fn next_state(current: DeviceState, trigger: ConversationTrigger) -> Option<DeviceState> {
    use ConversationTrigger::*;
    use DeviceState::*;

    // universal overrides
    match trigger {
        ServerDisconnected => return Some(Connecting),
        ForceIdle => return Some(Idle),
        _ => {}
    }

    match (current, trigger) {
        (Idle, StartVoiceChat) => Some(Listening),
        (Idle, KeywordDetected) => Some(Listening),
        (Idle, ConnectToServer) => Some(Connecting),

        (Connecting, ServerConnected) => Some(Idle),
        (Connecting, ConnectionFailed) => Some(Idle),

        (Listening, StopVoiceChat) => Some(Idle),
        (Listening, UserInterrupt) => Some(Idle),
        (Listening, TtsStarted) => Some(Speaking),
        (Listening, AudioReceived) => Some(Speaking),

        (Speaking, TtsCompleted) => Some(Idle),
        (Speaking, AudioPlaybackCompleted) => Some(Idle),
        (Speaking, UserInterrupt) => Some(Idle),
        (Speaking, KeywordDetected) => Some(Idle),
        (Speaking, StopVoiceChat) => Some(Idle),

        _ => None,
    }
}

struct Inner {
    current: DeviceState,
    observers: Vec<mpsc::UnboundedSender<StateTransition>>,
}

pub struct StateMachine {
    inner: Mutex<Inner>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::with_state(DeviceState::Idle)
    }

    pub fn with_state(initial: DeviceState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: initial,
                observers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> DeviceState {
        self.lock().current
    }

    /// Every transition applied after this call, in order. The channel is
    /// unbounded so a slow observer never stalls a transition.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StateTransition> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().observers.push(tx);
        rx
    }

    /// Applies `trigger`.
    ///
    /// Returns `true` when the transition was applied or would not change the
    /// state (no event is emitted then), `false` when the table has no entry.
    pub fn request_transition(&self, trigger: ConversationTrigger, context: Option<&str>) -> bool {
        let mut inner = self.lock();
        let from = inner.current;
        let Some(to) = next_state(from, trigger) else {
            tracing::debug!("rejected {:?} in state {}", trigger, from);
            return false;
        };
        if to == from {
            return true;
        }

        inner.current = to;
        let transition = StateTransition {
            from,
            to,
            trigger,
            context: context.map(str::to_string),
            timestamp: Utc::now(),
        };
        tracing::info!("state {} -> {} on {:?}", from, to, trigger);
        inner
            .observers
            .retain(|observer| observer.send(transition.clone()).is_ok());
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
