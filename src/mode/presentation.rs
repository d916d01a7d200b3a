//! Presentation projection of the interaction mode
//!
//! The control surface mirrors what the UI host renders: the mode marker,
//! which controls are voice-gated, the voice mode indicator and transient
//! notifications. Everything here is derived from the current mode and can
//! be regenerated by calling [`ControlSurface::apply`] again.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::machine::InteractionMode;

/// Attribute carrying the current mode for styling
pub const MODE_ATTRIBUTE: &str = "data-phoenix-mode";
/// Marker attribute placed on voice-gated controls
pub const VOICE_GATED_ATTRIBUTE: &str = "data-voice-mode";
/// Controls carrying one of these classes are never voice-gated
pub const EXEMPT_CLASSES: [&str; 2] = ["mode-toggle", "critical-action"];

pub const INDICATOR_SHOW_DELAY: Duration = Duration::from_millis(100);
pub const NOTIFICATION_SHOW_DELAY: Duration = Duration::from_millis(10);
pub const NOTIFICATION_VISIBLE_FOR: Duration = Duration::from_millis(3000);
/// Fade-out before an element is removed from the tree
pub const FADE_OUT: Duration = Duration::from_millis(300);
/// Toasts on screen at once
pub const MAX_NOTIFICATIONS: usize = 3;

/// Kind of interactive control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Button,
    Link,
    Input,
}

/// An interactive control known to the surface
#[derive(Debug, Clone, Serialize)]
pub struct Control {
    id: String,
    kind: ControlKind,
    classes: Vec<String>,
    label: Option<String>,
    aria_label: Option<String>,
    title: String,
    voice_gated: bool,
    /// Tooltip saved while the control is voice-gated
    original_title: Option<String>,
}

impl Control {
    pub fn new(id: impl Into<String>, kind: ControlKind) -> Self {
        Self {
            id: id.into(),
            kind,
            classes: Vec::new(),
            label: None,
            aria_label: None,
            title: String::new(),
            voice_gated: false,
            original_title: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_aria_label(mut self, aria_label: impl Into<String>) -> Self {
        self.aria_label = Some(aria_label.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn original_title(&self) -> Option<&str> {
        self.original_title.as_deref()
    }

    pub fn is_voice_gated(&self) -> bool {
        self.voice_gated
    }

    /// Whether the control stays interactive in voice mode
    pub fn is_exempt(&self) -> bool {
        self.classes
            .iter()
            .any(|class| EXEMPT_CLASSES.contains(&class.as_str()))
    }

    fn voice_prompt(&self) -> String {
        let target = [self.label.as_deref(), self.aria_label.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or("activate this");
        format!("Use voice to interact - say \"Phoenix, {target}\"")
    }

    fn gate(&mut self) {
        if self.is_exempt() {
            return;
        }
        self.voice_gated = true;
        if self.original_title.is_none() {
            self.original_title = Some(self.title.clone());
        }
        self.title = self.voice_prompt();
    }

    fn ungate(&mut self) {
        if !self.voice_gated {
            return;
        }
        self.voice_gated = false;
        if let Some(original) = self.original_title.take() {
            self.title = original;
        }
    }
}

/// Visibility phase of a transient element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Inserted but not yet visible
    Pending,
    Shown,
    /// Fading out
    Hiding,
    /// Gone from the tree
    Removed,
}

/// Persistent "voice mode active" indicator
#[derive(Debug, Clone)]
pub struct VoiceIndicator {
    shown_at: Instant,
    hiding_since: Option<Instant>,
}

impl VoiceIndicator {
    pub const TEXT: &'static str = "🎤 Voice Mode Active";
    pub const TOGGLE_LABEL: &'static str = "Switch to Manual";

    pub fn phase(&self, now: Instant) -> Phase {
        if let Some(since) = self.hiding_since {
            if now.saturating_duration_since(since) >= FADE_OUT {
                Phase::Removed
            } else {
                Phase::Hiding
            }
        } else if now.saturating_duration_since(self.shown_at) < INDICATOR_SHOW_DELAY {
            Phase::Pending
        } else {
            Phase::Shown
        }
    }

    pub fn shown_at(&self) -> Instant {
        self.shown_at
    }
}

/// Short-lived toast announcing a mode change
#[derive(Debug, Clone)]
pub struct ModeNotification {
    pub mode: InteractionMode,
    created_at: Instant,
}

impl ModeNotification {
    pub fn icon(&self) -> &'static str {
        match self.mode {
            InteractionMode::Voice => "🎤",
            InteractionMode::Manual => "👆",
        }
    }

    pub fn title(&self) -> &'static str {
        match self.mode {
            InteractionMode::Voice => "Voice Mode Activated",
            InteractionMode::Manual => "Manual Mode Activated",
        }
    }

    pub fn description(&self) -> &'static str {
        match self.mode {
            InteractionMode::Voice => "UI is now visual-only. Use voice for all interactions.",
            InteractionMode::Manual => "You can now click buttons and interact normally.",
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn phase(&self, now: Instant) -> Phase {
        let elapsed = now.saturating_duration_since(self.created_at);
        if elapsed < NOTIFICATION_SHOW_DELAY {
            Phase::Pending
        } else if elapsed < NOTIFICATION_VISIBLE_FOR {
            Phase::Shown
        } else if elapsed < NOTIFICATION_VISIBLE_FOR + FADE_OUT {
            Phase::Hiding
        } else {
            Phase::Removed
        }
    }
}

/// Descriptor for a mode toggle control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeToggle {
    pub icon: &'static str,
    pub label: &'static str,
    pub classes: [&'static str; 2],
}

impl ModeToggle {
    pub fn for_mode(mode: InteractionMode) -> Self {
        let (icon, label) = match mode {
            InteractionMode::Voice => ("🎤", "Voice"),
            InteractionMode::Manual => ("👆", "Manual"),
        };
        Self {
            icon,
            label,
            classes: ["phoenix-mode-toggle", "mode-toggle"],
        }
    }

    /// Toggle buttons carry an exempt class and are never gated
    pub fn to_control(&self, id: impl Into<String>) -> Control {
        self.classes
            .iter()
            .fold(Control::new(id, ControlKind::Button), |control, class| {
                control.with_class(*class)
            })
            .with_label(self.label)
    }
}

/// Projection of the current mode onto the UI
#[derive(Debug, Default)]
pub struct ControlSurface {
    mode: Option<InteractionMode>,
    controls: Vec<Control>,
    indicator: Option<VoiceIndicator>,
    notifications: Vec<ModeNotification>,
}

impl ControlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the [`MODE_ATTRIBUTE`] marker
    pub fn mode_marker(&self) -> Option<InteractionMode> {
        self.mode
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    pub fn indicator(&self) -> Option<&VoiceIndicator> {
        self.indicator.as_ref()
    }

    pub fn notifications(&self) -> &[ModeNotification] {
        &self.notifications
    }

    /// Add a control, gating it immediately if voice mode is applied
    pub fn register_control(&mut self, mut control: Control) {
        if self.mode == Some(InteractionMode::Voice) {
            control.gate();
        }
        self.controls.retain(|c| c.id != control.id);
        self.controls.push(control);
    }

    /// Project `mode` onto marker, controls and indicator
    pub fn apply(&mut self, mode: InteractionMode) {
        self.apply_at(mode, Instant::now());
    }

    fn apply_at(&mut self, mode: InteractionMode, now: Instant) {
        self.prune(now);
        self.mode = Some(mode);
        match mode {
            InteractionMode::Voice => {
                self.controls.iter_mut().for_each(Control::gate);
                self.show_indicator(now);
            }
            InteractionMode::Manual => {
                self.controls.iter_mut().for_each(Control::ungate);
                self.hide_indicator(now);
            }
        }
    }

    /// Announce a mode change. At most [`MAX_NOTIFICATIONS`] toasts are
    /// kept; the oldest give way first.
    pub fn push_notification(&mut self, mode: InteractionMode) {
        self.push_notification_at(mode, Instant::now());
    }

    fn push_notification_at(&mut self, mode: InteractionMode, now: Instant) {
        self.prune(now);
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            let excess = self.notifications.len() + 1 - MAX_NOTIFICATIONS;
            self.notifications.drain(..excess);
        }
        self.notifications.push(ModeNotification {
            mode,
            created_at: now,
        });
    }

    /// Drop elements that have finished fading out
    pub fn prune(&mut self, now: Instant) {
        self.notifications.retain(|n| n.phase(now) != Phase::Removed);
        if self
            .indicator
            .as_ref()
            .is_some_and(|i| i.phase(now) == Phase::Removed)
        {
            self.indicator = None;
        }
    }

    fn show_indicator(&mut self, now: Instant) {
        if let Some(indicator) = self
            .indicator
            .as_mut()
            .filter(|i| i.phase(now) != Phase::Removed)
        {
            if indicator.hiding_since.take().is_some() {
                indicator.shown_at = now;
            }
            return;
        }
        self.indicator = Some(VoiceIndicator {
            shown_at: now,
            hiding_since: None,
        });
    }

    fn hide_indicator(&mut self, now: Instant) {
        if let Some(indicator) = &mut self.indicator {
            if indicator.hiding_since.is_none() {
                indicator.hiding_since = Some(now);
            }
        }
    }
}
