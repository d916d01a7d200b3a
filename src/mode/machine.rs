//! Interaction mode state machine
//!
//! Two states, Voice and Manual. Transitions are persisted, projected onto
//! the control surface and fanned out to registered listeners.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::VoiceEvent;

use super::presentation::{ControlSurface, ModeToggle};
use super::store::ModeStore;

/// The two interaction modes of the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Hands-free: controls are visual only, everything is driven by voice
    Voice,
    /// Interactive: controls work normally
    #[default]
    Manual,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Voice => "voice",
            InteractionMode::Manual => "manual",
        }
    }

    /// The mode a toggle switches to
    pub fn opposite(&self) -> Self {
        match self {
            InteractionMode::Voice => InteractionMode::Manual,
            InteractionMode::Manual => InteractionMode::Voice,
        }
    }
}

impl std::fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice" => Ok(InteractionMode::Voice),
            "manual" => Ok(InteractionMode::Manual),
            other => Err(ModeError::Invalid(other.to_string())),
        }
    }
}

/// Errors raised when interpreting a mode value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("invalid mode: {0:?}")]
    Invalid(String),
}

/// Callback invoked with `(new_mode, previous_mode)` on every committed change
pub type ModeListener =
    Box<dyn FnMut(InteractionMode, InteractionMode) -> anyhow::Result<()> + Send>;

/// Handle returned by [`ModeManager::add_listener`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Single authority for the current interaction mode
pub struct ModeManager {
    /// Current mode
    mode: InteractionMode,
    /// When the current mode was entered
    mode_entered_at: Instant,
    /// Durable preference storage
    store: Box<dyn ModeStore>,
    /// Projection of the mode onto UI controls
    surface: ControlSurface,
    /// Registered listeners, unordered
    listeners: HashMap<ListenerHandle, ModeListener>,
    next_listener_id: u64,
    /// Optional observability channel
    event_tx: Option<broadcast::Sender<VoiceEvent>>,
}

impl ModeManager {
    /// Create a manager, restoring the persisted mode (Manual if absent or invalid)
    pub fn new(store: Box<dyn ModeStore>, mut surface: ControlSurface) -> Self {
        let mode = match store.load() {
            Ok(Some(raw)) => raw.parse::<InteractionMode>().unwrap_or_else(|e: ModeError| {
                warn!(error = %e, "ignoring persisted mode preference");
                InteractionMode::Manual
            }),
            Ok(None) => InteractionMode::Manual,
            Err(e) => {
                warn!(?e, "failed to read mode preference");
                InteractionMode::Manual
            }
        };

        surface.apply(mode);
        info!(%mode, "mode manager initialized");

        Self {
            mode,
            mode_entered_at: Instant::now(),
            store,
            surface,
            listeners: HashMap::new(),
            next_listener_id: 0,
            event_tx: None,
        }
    }

    /// Publish committed mode changes on the given channel
    pub fn with_events(mut self, event_tx: broadcast::Sender<VoiceEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn is_voice_mode(&self) -> bool {
        self.mode == InteractionMode::Voice
    }

    pub fn is_manual_mode(&self) -> bool {
        self.mode == InteractionMode::Manual
    }

    pub fn surface(&self) -> &ControlSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut ControlSurface {
        &mut self.surface
    }

    /// Descriptor for a toggle control reflecting the current mode
    pub fn toggle_control(&self) -> ModeToggle {
        ModeToggle::for_mode(self.mode)
    }

    /// Set the mode from an untyped value
    ///
    /// Returns `false` without touching any state if `raw` is not a valid mode.
    pub fn request_mode(&mut self, raw: &str) -> bool {
        match raw.parse() {
            Ok(mode) => self.set_mode(mode),
            Err(e) => {
                error!(error = %e, "rejected mode change");
                false
            }
        }
    }

    /// Set the mode. Setting the current mode is a no-op that notifies nobody.
    pub fn set_mode(&mut self, target: InteractionMode) -> bool {
        if self.mode == target {
            debug!(mode = %target, "already in requested mode");
            return true;
        }

        let previous = self.mode;
        let duration_ms = self.mode_entered_at.elapsed().as_millis() as u64;

        self.mode = target;
        self.mode_entered_at = Instant::now();

        if let Err(e) = self.store.save(target) {
            warn!(?e, "failed to persist mode preference");
        }

        self.surface.apply(target);
        self.notify_listeners(target, previous);

        info!(
            from = %previous,
            to = %target,
            duration_ms = duration_ms,
            "mode transition"
        );

        self.surface.push_notification(target);

        if let Some(tx) = &self.event_tx {
            let _ = tx.send(VoiceEvent::ModeChanged {
                mode: target,
                previous,
                duration_ms,
            });
        }

        true
    }

    /// Switch to the opposite mode
    pub fn toggle_mode(&mut self) -> bool {
        self.set_mode(self.mode.opposite())
    }

    /// Register a listener for committed mode changes
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerHandle
    where
        F: FnMut(InteractionMode, InteractionMode) -> anyhow::Result<()> + Send + 'static,
    {
        let handle = ListenerHandle(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.insert(handle, Box::new(listener));
        handle
    }

    /// Unregister a listener. Returns `false` if it was already gone.
    pub fn remove_listener(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.remove(&handle).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify_listeners(&mut self, mode: InteractionMode, previous: InteractionMode) {
        for (handle, listener) in self.listeners.iter_mut() {
            if let Err(e) = listener(mode, previous) {
                error!(?handle, ?e, "mode listener failed");
            }
        }
    }
}
