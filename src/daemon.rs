//! Daemon services and the voice-command flow
//!
//! Owns the mode manager, the speech shim and the wake-word detector, and
//! keeps at most one of the two recognizers listening: a wake phrase hands
//! the microphone to a voice-command session, and the detector resumes once
//! that session ends.

use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::events::VoiceEvent;
use crate::mode::ModeManager;
use crate::speech::{
    Environment, PlatformSpeechRecognition, RecognitionOptions, RecognitionSession,
    RelaySpeechApi, SpeechError,
};
use crate::wake::WakeWordDetector;

/// Shared daemon services
pub struct Daemon {
    mode: Mutex<ModeManager>,
    speech: PlatformSpeechRecognition,
    wake: WakeWordDetector,
    relay: Arc<RelaySpeechApi>,
    speech_options: RecognitionOptions,
    wake_word_enabled: bool,
    start_time: Instant,
}

impl Daemon {
    /// Build the services and wire the voice-command flow
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        mode: ModeManager,
        env: Environment,
        relay: Arc<RelaySpeechApi>,
        settings: &Settings,
        event_tx: broadcast::Sender<VoiceEvent>,
    ) -> Arc<Self> {
        let wake_word_enabled =
            settings.wake_word_enabled && WakeWordDetector::is_supported(&env);
        if settings.wake_word_enabled && !wake_word_enabled {
            warn!("wake word detection enabled but not supported here");
        }

        let wake = WakeWordDetector::new(&env, &settings.wake_word).with_events(event_tx.clone());
        let speech = PlatformSpeechRecognition::new(env).with_events(event_tx.clone());

        let daemon = Arc::new(Self {
            mode: Mutex::new(mode.with_events(event_tx)),
            speech,
            wake,
            relay,
            speech_options: settings.speech.clone(),
            wake_word_enabled,
            start_time: Instant::now(),
        });
        daemon.wire_voice_commands();
        daemon
    }

    fn wire_voice_commands(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.wake.on_wake_word(move |event| {
            let Some(daemon) = weak.upgrade() else {
                return;
            };
            debug!(transcript = %event.transcript, "handing over to voice command");
            daemon.wake.stop();
            tokio::spawn(async move {
                if let Err(e) = daemon.start_listening(None).await {
                    warn!(error = %e, "voice command listening failed to start");
                }
            });
        });

        let weak = Arc::downgrade(self);
        self.speech.on_end(move || {
            if let Some(daemon) = weak.upgrade() {
                daemon.resume_wake_word();
            }
        });

        self.speech.on_error(|code| debug!(%code, "voice command recognition error"));
    }

    pub fn mode(&self) -> &Mutex<ModeManager> {
        &self.mode
    }

    pub fn speech(&self) -> &PlatformSpeechRecognition {
        &self.speech
    }

    pub fn wake(&self) -> &WakeWordDetector {
        &self.wake
    }

    pub fn relay(&self) -> &RelaySpeechApi {
        &self.relay
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Open a voice-command session, pausing wake-word detection meanwhile
    pub async fn start_listening(
        &self,
        options: Option<RecognitionOptions>,
    ) -> Result<RecognitionSession, SpeechError> {
        let options = options.unwrap_or_else(|| self.speech_options.clone());
        self.wake.stop();
        if let Err(e) = self.speech.start_listening(&options).await {
            self.resume_wake_word();
            return Err(e);
        }
        Ok(self.speech.session().await)
    }

    pub async fn stop_listening(&self) -> RecognitionSession {
        self.speech.stop_listening().await;
        self.speech.session().await
    }

    /// Start wake-word detection if enabled. Returns whether it is running.
    pub fn resume_wake_word(&self) -> bool {
        if !self.wake_word_enabled {
            return false;
        }
        self.wake.start();
        self.wake.is_active()
    }

    /// Release the microphone
    pub async fn shutdown(&self) {
        self.wake.stop();
        self.speech.stop_listening().await;
        info!("speech services stopped");
    }
}
