//! phoenix-daemon: interaction-mode and speech recognition core for the
//! Phoenix voice assistant
//!
//! Provides:
//! - A voice/manual interaction mode manager with persistence and listeners
//! - A speech recognition shim over native and browser backends
//! - A continuous wake-word detector
//! - IPC server exposing the mode toggle and speech controls to the UI host

pub mod config;
pub mod daemon;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod mode;
pub mod speech;
pub mod wake;
