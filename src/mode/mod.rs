//! Interaction mode management
//!
//! Provides the voice/manual mode authority:
//! - Voice: controls are visual only, interaction happens by voice
//! - Manual: full interactivity
//!
//! The current mode is persisted, projected onto the control surface and
//! broadcast to registered listeners.

mod machine;
mod presentation;
mod store;

pub use machine::{InteractionMode, ListenerHandle, ModeError, ModeListener, ModeManager};
pub use presentation::{
    Control, ControlKind, ControlSurface, ModeNotification, ModeToggle, Phase, VoiceIndicator,
    EXEMPT_CLASSES, MAX_NOTIFICATIONS, MODE_ATTRIBUTE, VOICE_GATED_ATTRIBUTE,
};
pub use store::{FileModeStore, ModeStore, MODE_STORAGE_KEY};

#[cfg(test)]
pub use store::MemoryModeStore;
