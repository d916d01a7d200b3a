//! Speech recognition platform layer
//!
//! Detects what the host offers (native plugin or browser recognizer) and
//! presents one contract over it.

mod backend;
mod capability;
mod relay;
mod shim;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    Alternative, BrowserEvent, BrowserRecognizer, BrowserSpeechApi, EventSink, NativeBridge,
    NativeEvent, NativeSpeechPlugin, NativeStartOptions, PermissionState, RecognitionOptions,
    RecognitionResult, ResultBatch, SpeechError, SpeechResult,
};
pub use capability::{Environment, Platform, PlatformCapability, PlatformInfo};
pub use relay::{RecognizerAction, RecognizerCommand, RelaySpeechApi};
pub use shim::{ActiveBackend, InitOutcome, PlatformSpeechRecognition, RecognitionSession};
