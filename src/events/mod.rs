//! Events module for mode and speech transitions
//!
//! Structured events published by the mode manager, the speech shim and the
//! wake-word detector. They are broadcast to IPC subscribers and double as
//! the observability stream for tests.

use serde::{Deserialize, Serialize};

use crate::mode::InteractionMode;
use crate::speech::ActiveBackend;

/// Events emitted by the daemon's components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Interaction mode changed
    ModeChanged {
        mode: InteractionMode,
        previous: InteractionMode,
        /// Milliseconds spent in the previous mode
        duration_ms: u64,
    },

    /// A recognition session started
    ListeningStarted { backend: ActiveBackend },

    /// The recognition session ended or was stopped
    ListeningStopped,

    /// A wake phrase was heard
    WakeWordDetected {
        transcript: String,
        confidence: f32,
        timestamp_ms: u64,
    },

    /// A recognition error surfaced to callers
    RecognitionError { code: String },
}

impl std::fmt::Display for VoiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceEvent::ModeChanged {
                mode,
                previous,
                duration_ms,
            } => write!(f, "MODE_CHANGED ({previous} -> {mode}, {duration_ms}ms)"),
            VoiceEvent::ListeningStarted { backend } => {
                write!(f, "LISTENING_STARTED ({backend:?})")
            }
            VoiceEvent::ListeningStopped => write!(f, "LISTENING_STOPPED"),
            VoiceEvent::WakeWordDetected {
                transcript,
                confidence,
                ..
            } => write!(f, "WAKE_WORD_DETECTED ({transcript:?}, {confidence:.2})"),
            VoiceEvent::RecognitionError { code } => write!(f, "RECOGNITION_ERROR ({code})"),
        }
    }
}
