//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::VoiceEvent;
use crate::mode::InteractionMode;
use crate::speech::{
    BrowserEvent, Platform, PlatformInfo, RecognitionOptions, RecognitionSession,
    RecognizerCommand,
};
use crate::wake::WakeWordStats;

/// Upper bound on a single framed message
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    GetMode,

    /// Switch to `voice` or `manual`. Any other value is rejected.
    SetMode { mode: String },

    ToggleMode,

    /// Start a voice-command listening session
    StartListening {
        #[serde(default)]
        options: Option<RecognitionOptions>,
    },

    StopListening,

    GetPlatformInfo,

    GetWakeStats,

    RestartWakeWord,

    /// Event raised by a recognizer the host runs for the daemon
    RecognizerEvent { recognizer: u64, event: BrowserEvent },

    /// Subscribe to event and recognizer command notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Current mode, and whether the request changed it
    Mode { mode: InteractionMode, changed: bool },

    Listening(RecognitionSession),

    Platform(PlatformInfo),

    WakeStats(WakeWordStats),

    Ack,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum Notification {
    Event(VoiceEvent),

    /// The host should start or stop one of its recognizers
    RecognizerCommand(RecognizerCommand),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub mode: InteractionMode,

    pub platform: Platform,

    /// A voice-command session is open
    pub is_listening: bool,

    pub wake_word_active: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}
