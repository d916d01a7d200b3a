//! Speech backend contracts
//!
//! The shim talks to two kinds of backend: a native plugin reached through
//! the host's bridge, and a browser-style recognizer. Both deliver their
//! events on an unbounded channel handed over at wiring time.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Channel on which a backend pushes its events
pub type EventSink<E> = mpsc::UnboundedSender<E>;

/// Errors raised by speech backends and the shim
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech recognition permission denied")]
    PermissionDenied,

    #[error("speech recognition not supported on this platform")]
    NotSupported,

    #[error("SpeechRecognition plugin not found in native bridge")]
    PluginMissing,

    #[error("no speech recognition backend available")]
    NoBackendAvailable,

    #[error("speech backend error: {0}")]
    Backend(String),
}

impl SpeechError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            SpeechError::PermissionDenied => "permission_denied",
            SpeechError::NotSupported => "not_supported",
            SpeechError::PluginMissing => "plugin_missing",
            SpeechError::NoBackendAvailable => "no_backend",
            SpeechError::Backend(_) => "backend_error",
        }
    }
}

/// Recognition options accepted by `initialize` and `start_listening`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionOptions {
    pub language: String,
    pub interim_results: bool,
    pub max_alternatives: u32,
    pub continuous: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "en-US".into(),
            interim_results: true,
            max_alternatives: 3,
            continuous: false,
        }
    }
}

/// Backend-independent recognition result handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
    pub confidence: f32,
}

/// One hypothesis for a recognized utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

impl Alternative {
    pub fn new(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            transcript: transcript.into(),
            confidence,
        }
    }
}

/// A recognized utterance with its ranked alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechResult {
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub is_final: bool,
}

/// All results of a recognition session, plus the first changed index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBatch {
    #[serde(default)]
    pub result_index: usize,
    pub results: Vec<SpeechResult>,
}

impl ResultBatch {
    /// A batch holding a single result
    pub fn single(alternatives: Vec<Alternative>, is_final: bool) -> Self {
        Self {
            result_index: 0,
            results: vec![SpeechResult {
                alternatives,
                is_final,
            }],
        }
    }
}

/// Events emitted by a browser-style recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    Start,
    Result(ResultBatch),
    /// Error code such as `no-speech` or `not-allowed`
    Error { error: String },
    End,
}

/// Events emitted by the native plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeEvent {
    PartialResults { matches: Vec<String> },
    ListeningState { listening: bool },
}

/// Native permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Option shape expected by the native plugin's `start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeStartOptions {
    pub language: String,
    pub max_results: u32,
    pub prompt: String,
    pub partial_results: bool,
    pub popup: bool,
}

impl From<&RecognitionOptions> for NativeStartOptions {
    fn from(options: &RecognitionOptions) -> Self {
        Self {
            language: options.language.clone(),
            max_results: options.max_alternatives,
            prompt: "Say something to Phoenix".into(),
            partial_results: options.interim_results,
            popup: false,
        }
    }
}

/// The host's native bridge
pub trait NativeBridge: Send + Sync {
    /// Platform name reported by the bridge (`"ios"`, `"android"`, ...)
    fn platform(&self) -> String;

    /// The speech recognition plugin, if the host registered one
    fn speech_plugin(&self) -> Option<Arc<dyn NativeSpeechPlugin>>;
}

/// Native on-device speech recognition plugin
#[async_trait]
pub trait NativeSpeechPlugin: Send + Sync {
    async fn request_permissions(&self) -> Result<PermissionState, SpeechError>;

    async fn start(&self, options: NativeStartOptions) -> Result<(), SpeechError>;

    async fn stop(&self) -> Result<(), SpeechError>;

    /// Subscribe to `partialResults` and `listeningState` events
    fn add_listeners(&self, events: EventSink<NativeEvent>);

    fn remove_all_listeners(&self);
}

/// Factory for browser-style recognizers
pub trait BrowserSpeechApi: Send + Sync {
    /// Create a recognizer configured with `options`, wired to `events`
    fn create_recognizer(
        &self,
        options: &RecognitionOptions,
        events: EventSink<BrowserEvent>,
    ) -> Result<Arc<dyn BrowserRecognizer>, SpeechError>;
}

/// A configured browser-style recognizer
pub trait BrowserRecognizer: Send + Sync {
    fn start(&self) -> Result<(), SpeechError>;

    fn stop(&self) -> Result<(), SpeechError>;
}
