//! Wake-word detection
//!
//! Continuous listening for trigger phrases such as "hey phoenix", with a
//! short debounce after each trigger and automatic restarts when the
//! recognizer ends its session.

mod detector;
mod matcher;

pub use detector::{
    WakeWordDetector, WakeWordEvent, WakeWordStats, AUTO_RESTART_DELAY, DEBOUNCE,
    MANUAL_RESTART_DELAY,
};
pub use matcher::{WakeMatch, WakeWordConfig, WakeWordMatcher, MAX_ALTERNATIVES};
