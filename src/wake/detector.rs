//! Continuous wake-word listening
//!
//! Keeps a continuous recognizer running for the lifetime of the detector,
//! restarting it whenever the backend ends a session, and fires the wake
//! callback when a trigger phrase is heard with enough confidence.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::events::VoiceEvent;
use crate::speech::{BrowserEvent, BrowserRecognizer, Environment, RecognitionOptions, ResultBatch};

use super::matcher::{WakeWordConfig, WakeWordMatcher};

/// Detection is suspended this long after a trigger
pub const DEBOUNCE: Duration = Duration::from_millis(1000);
/// Delay before restarting a session the backend ended
pub const AUTO_RESTART_DELAY: Duration = Duration::from_millis(100);
/// Pause between stop and start in [`WakeWordDetector::restart`]
pub const MANUAL_RESTART_DELAY: Duration = Duration::from_millis(500);

/// Error code the backend reports when nothing was said
const NO_SPEECH: &str = "no-speech";
/// Error code the backend reports when microphone access is refused
const NOT_ALLOWED: &str = "not-allowed";

/// A positive wake phrase match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeWordEvent {
    pub transcript: String,
    pub confidence: f32,
    /// Unix time in milliseconds
    pub timestamp_ms: u64,
}

/// Diagnostic snapshot of the detector
///
/// `is_active` stays set through the debounce window after a detection;
/// `is_suspended` reports that window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeWordStats {
    pub is_active: bool,
    pub is_listening: bool,
    pub is_suspended: bool,
    pub detection_count: u64,
    pub last_detection_ms: Option<u64>,
    pub since_last_detection_ms: Option<u64>,
}

type WakeCallback = Arc<dyn Fn(WakeWordEvent) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Default)]
struct DetectorState {
    /// Logically running; independent of whether a session is open
    active: bool,
    /// A recognizer session is open
    listening: bool,
    suspended_until: Option<Instant>,
    /// Bumped on every start/stop so stale restarts are dropped
    generation: u64,
    /// Sessions closed by `stop` whose end event has not arrived yet
    stale_ends: u32,
    detection_count: u64,
    last_detection: Option<(u64, Instant)>,
}

struct Shared {
    state: Mutex<DetectorState>,
    recognizer: Option<Arc<dyn BrowserRecognizer>>,
    matcher: WakeWordMatcher,
    on_wake: Mutex<Option<WakeCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
    event_tx: OnceLock<broadcast::Sender<VoiceEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, DetectorState> {
        lock(&self.state)
    }

    fn publish(&self, event: VoiceEvent) {
        if let Some(tx) = self.event_tx.get() {
            let _ = tx.send(event);
        }
    }

    fn report_error(&self, code: String) {
        self.publish(VoiceEvent::RecognitionError { code: code.clone() });
        let callback = lock(&self.on_error).clone();
        if let Some(callback) = callback {
            callback(code);
        }
    }

    fn start(&self) {
        let Some(recognizer) = &self.recognizer else {
            error!("speech recognition not initialized");
            return;
        };

        {
            let mut state = self.state();
            if state.active {
                warn!("wake word detector already running");
                return;
            }
            state.active = true;
            state.suspended_until = None;
            state.generation += 1;
        }

        info!(wake_words = ?self.matcher.wake_words(), "starting wake word detection");
        if let Err(e) = recognizer.start() {
            self.state().active = false;
            error!(error = %e, "failed to start wake word detection");
            self.report_error(e.to_string());
            return;
        }
        self.state().listening = true;
    }

    fn stop(&self) {
        let was_listening = {
            let mut state = self.state();
            if !state.active {
                return;
            }
            state.active = false;
            state.suspended_until = None;
            state.generation += 1;
            std::mem::replace(&mut state.listening, false)
        };

        info!("stopping wake word detection");
        if let (true, Some(recognizer)) = (was_listening, &self.recognizer) {
            match recognizer.stop() {
                Ok(()) => self.state().stale_ends += 1,
                Err(e) => error!(error = %e, "error stopping wake word recognizer"),
            }
        }
    }

    fn handle_result(&self, batch: &ResultBatch) {
        let now = Instant::now();
        let event = {
            let mut state = self.state();
            if !state.active || state.suspended_until.is_some_and(|until| now < until) {
                return;
            }
            let Some(found) = self.matcher.find_match(batch) else {
                return;
            };

            let timestamp_ms = unix_millis();
            state.detection_count += 1;
            state.last_detection = Some((timestamp_ms, now));
            state.suspended_until = Some(now + DEBOUNCE);

            WakeWordEvent {
                transcript: found.transcript,
                confidence: found.confidence,
                timestamp_ms,
            }
        };

        info!(
            transcript = %event.transcript,
            confidence = event.confidence,
            "wake word detected"
        );
        self.publish(VoiceEvent::WakeWordDetected {
            transcript: event.transcript.clone(),
            confidence: event.confidence,
            timestamp_ms: event.timestamp_ms,
        });

        let callback = lock(&self.on_wake).clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn handle_error(&self, code: String) {
        if code == NO_SPEECH {
            debug!("no speech detected");
            return;
        }

        error!(code = %code, "wake word detection error");
        if code == NOT_ALLOWED {
            error!("microphone access denied, stopping wake word detection");
            self.stop();
        }
        self.report_error(code);
    }

    fn handle_end(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state();
            if state.stale_ends > 0 {
                state.stale_ends -= 1;
                if state.active {
                    debug!("ignoring end of a stopped session");
                    return;
                }
            }
            state.listening = false;
            if !state.active {
                return;
            }
            state.generation
        };

        debug!("restarting wake word detection");
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(AUTO_RESTART_DELAY).await;
            {
                let state = shared.state();
                if !state.active || state.generation != generation {
                    return;
                }
            }
            let Some(recognizer) = &shared.recognizer else {
                return;
            };
            match recognizer.start() {
                Ok(()) => shared.state().listening = true,
                Err(e) => {
                    error!(error = %e, "failed to restart wake word detection");
                    shared.report_error(e.to_string());
                }
            }
        });
    }
}

async fn pump_events(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<BrowserEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            BrowserEvent::Start => {
                debug!("wake word detector listening");
                shared.state().listening = true;
            }
            BrowserEvent::Result(batch) => shared.handle_result(&batch),
            BrowserEvent::Error { error } => shared.handle_error(error),
            BrowserEvent::End => shared.handle_end(),
        }
    }
}

/// Hands-free wake phrase detector
///
/// Must be created inside a Tokio runtime.
pub struct WakeWordDetector {
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
}

impl WakeWordDetector {
    pub fn new(env: &Environment, config: &WakeWordConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recognizer = match env.browser_speech() {
            Some(api) => match api.create_recognizer(&Self::recognition_options(), events_tx) {
                Ok(recognizer) => Some(recognizer),
                Err(e) => {
                    error!(error = %e, "failed to create wake word recognizer");
                    None
                }
            },
            None => {
                error!("wake word detection not supported on this platform");
                None
            }
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(DetectorState::default()),
            recognizer,
            matcher: WakeWordMatcher::new(config),
            on_wake: Mutex::new(None),
            on_error: Mutex::new(None),
            event_tx: OnceLock::new(),
        });

        let pump = shared
            .recognizer
            .is_some()
            .then(|| tokio::spawn(pump_events(Arc::clone(&shared), events_rx)));

        if pump.is_some() {
            info!(wake_words = ?shared.matcher.wake_words(), "wake word detector initialized");
        }

        Self { shared, pump }
    }

    /// Recognizer configuration used for wake phrase listening
    pub fn recognition_options() -> RecognitionOptions {
        RecognitionOptions {
            language: "en-US".into(),
            interim_results: true,
            max_alternatives: 3,
            continuous: true,
        }
    }

    /// Whether the environment can run wake-word detection at all
    pub fn is_supported(env: &Environment) -> bool {
        env.browser_speech().is_some()
    }

    /// Publish detections and surfaced errors on the given channel
    pub fn with_events(self, event_tx: broadcast::Sender<VoiceEvent>) -> Self {
        let _ = self.shared.event_tx.set(event_tx);
        self
    }

    pub fn on_wake_word(&self, callback: impl Fn(WakeWordEvent) + Send + Sync + 'static) {
        *lock(&self.shared.on_wake) = Some(Arc::new(callback));
    }

    pub fn on_error(&self, callback: impl Fn(String) + Send + Sync + 'static) {
        *lock(&self.shared.on_error) = Some(Arc::new(callback));
    }

    /// Begin listening. A no-op with a warning if already active.
    pub fn start(&self) {
        self.shared.start();
    }

    /// Stop listening and mark the detector inactive
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub async fn restart(&self) {
        self.stop();
        tokio::time::sleep(MANUAL_RESTART_DELAY).await;
        self.start();
    }

    pub fn is_active(&self) -> bool {
        self.shared.state().active
    }

    pub fn stats(&self) -> WakeWordStats {
        let state = self.shared.state();
        WakeWordStats {
            is_active: state.active,
            is_listening: state.listening,
            is_suspended: state
                .suspended_until
                .is_some_and(|until| Instant::now() < until),
            detection_count: state.detection_count,
            last_detection_ms: state.last_detection.map(|(at, _)| at),
            since_last_detection_ms: state
                .last_detection
                .map(|(_, seen)| seen.elapsed().as_millis() as u64),
        }
    }
}

impl Drop for WakeWordDetector {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::speech::testing::{FakeBrowserApi, FakeRecognizer};
    use crate::speech::Alternative;

    struct Harness {
        detector: WakeWordDetector,
        recognizer: Arc<FakeRecognizer>,
        wakes: mpsc::UnboundedReceiver<WakeWordEvent>,
        errors: mpsc::UnboundedReceiver<String>,
    }

    fn harness() -> Harness {
        let api = Arc::new(FakeBrowserApi::new());
        let env = Environment::new().with_browser_speech(Arc::clone(&api) as _);
        let detector = WakeWordDetector::new(&env, &WakeWordConfig::default());

        let (wake_tx, wakes) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        detector.on_wake_word(move |event| {
            let _ = wake_tx.send(event);
        });
        detector.on_error(move |code| {
            let _ = error_tx.send(code);
        });

        Harness {
            detector,
            recognizer: api.latest(),
            wakes,
            errors,
        }
    }

    fn phrase(transcript: &str, confidence: f32) -> BrowserEvent {
        BrowserEvent::Result(ResultBatch::single(
            vec![Alternative::new(transcript, confidence)],
            false,
        ))
    }

    /// Let the event pump drain; paused time only advances once it is idle
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognizer_configured_for_continuous_listening() {
        let h = harness();
        assert!(h.recognizer.options.continuous);
        assert!(h.recognizer.options.interim_results);
        assert_eq!(h.recognizer.options.language, "en-US");
        assert_eq!(h.recognizer.options.max_alternatives, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_word_fires_once() {
        let mut h = harness();
        h.detector.start();

        h.recognizer.emit(phrase("Hey Phoenix", 0.8));
        settle().await;

        let event = h.wakes.try_recv().unwrap();
        assert!(event.transcript.contains("hey phoenix"));
        assert_eq!(event.confidence, 0.8);
        assert!(h.wakes.try_recv().is_err());
        assert_eq!(h.detector.stats().detection_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_confidence_ignored() {
        let mut h = harness();
        h.detector.start();

        h.recognizer.emit(phrase("hey phoenix", 0.4));
        settle().await;

        assert!(h.wakes.try_recv().is_err());
        assert_eq!(h.detector.stats().detection_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_ignored_while_inactive() {
        let mut h = harness();

        h.recognizer.emit(phrase("hey phoenix", 0.9));
        settle().await;

        assert!(h.wakes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_window() {
        let mut h = harness();
        h.detector.start();

        h.recognizer.emit(phrase("hey phoenix", 0.8));
        settle().await;
        assert!(h.wakes.try_recv().is_ok());

        h.recognizer.emit(phrase("hey phoenix", 0.8));
        settle().await;
        assert!(h.wakes.try_recv().is_err());

        tokio::time::advance(DEBOUNCE).await;
        h.recognizer.emit(phrase("hey phoenix", 0.8));
        settle().await;
        assert!(h.wakes.try_recv().is_ok());
        assert_eq!(h.detector.stats().detection_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_speech_suppressed() {
        let mut h = harness();
        h.detector.start();

        h.recognizer.emit(BrowserEvent::Error {
            error: "no-speech".into(),
        });
        settle().await;

        assert!(h.errors.try_recv().is_err());
        assert!(h.detector.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_allowed_stops_detector() {
        let mut h = harness();
        h.detector.start();

        h.recognizer.emit(BrowserEvent::Error {
            error: "not-allowed".into(),
        });
        settle().await;

        assert_eq!(h.errors.try_recv().unwrap(), "not-allowed");
        assert!(!h.detector.is_active());
        assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);

        h.detector.start();
        assert!(h.detector.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_surface_without_stopping() {
        let mut h = harness();
        h.detector.start();

        h.recognizer.emit(BrowserEvent::Error {
            error: "network".into(),
        });
        settle().await;

        assert_eq!(h.errors.try_recv().unwrap(), "network");
        assert!(h.detector.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_restart_after_end() {
        let h = harness();
        h.detector.start();

        for _ in 0..3 {
            h.recognizer.emit(BrowserEvent::End);
            settle().await;
            assert!(!h.detector.stats().is_listening);
            tokio::time::sleep(AUTO_RESTART_DELAY).await;
            assert!(h.detector.stats().is_listening);
        }

        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_restart_during_debounce() {
        let mut h = harness();
        h.detector.start();
        h.recognizer.emit(phrase("ok phoenix", 0.9));
        h.recognizer.emit(BrowserEvent::End);
        settle().await;
        assert!(h.wakes.try_recv().is_ok());

        tokio::time::sleep(AUTO_RESTART_DELAY).await;
        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_restart_after_stop() {
        let h = harness();
        h.detector.start();
        h.detector.stop();

        h.recognizer.emit(BrowserEvent::End);
        tokio::time::sleep(AUTO_RESTART_DELAY * 2).await;

        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 1);
        assert!(!h.detector.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_restart_dropped_after_stop_start() {
        let h = harness();
        h.detector.start();
        h.recognizer.emit(BrowserEvent::End);
        settle().await;

        h.detector.stop();
        h.detector.start();
        tokio::time::sleep(AUTO_RESTART_DELAY * 2).await;

        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_end_of_stopped_session_ignored() {
        let h = harness();
        h.detector.start();
        h.detector.stop();
        h.detector.start();

        // End of the session closed by stop arrives after the fresh start
        h.recognizer.emit(BrowserEvent::End);
        tokio::time::sleep(AUTO_RESTART_DELAY * 2).await;

        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 2);
        assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);
        assert!(h.detector.stats().is_listening);

        h.recognizer.emit(BrowserEvent::End);
        settle().await;
        assert!(!h.detector.stats().is_listening);
        tokio::time::sleep(AUTO_RESTART_DELAY).await;

        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 3);
        assert!(h.detector.stats().is_listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_after_stop_consumed_before_next_start() {
        let h = harness();
        h.detector.start();
        h.detector.stop();
        h.recognizer.emit(BrowserEvent::End);
        settle().await;

        h.detector.start();
        h.recognizer.emit(BrowserEvent::End);
        settle().await;
        tokio::time::sleep(AUTO_RESTART_DELAY).await;

        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let h = harness();
        h.detector.start();
        h.detector.start();
        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_reports_and_stays_inactive() {
        let mut h = harness();
        h.recognizer.fail_start.store(true, Ordering::SeqCst);

        h.detector.start();

        assert!(!h.detector.is_active());
        assert!(h.errors.try_recv().unwrap().contains("start failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_swallows_backend_error() {
        let h = harness();
        h.recognizer.fail_stop.store(true, Ordering::SeqCst);
        h.detector.start();

        h.detector.stop();

        let stats = h.detector.stats();
        assert!(!stats.is_active);
        assert!(!stats.is_listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart() {
        let h = harness();
        h.detector.start();

        h.detector.restart().await;

        assert!(h.detector.is_active());
        assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_suspension() {
        let h = harness();
        h.detector.start();
        assert!(!h.detector.stats().is_suspended);

        h.recognizer.emit(phrase("hey phoenix", 0.9));
        settle().await;
        let stats = h.detector.stats();
        assert!(stats.is_active);
        assert!(stats.is_suspended);

        tokio::time::advance(DEBOUNCE).await;
        let stats = h.detector.stats();
        assert!(stats.is_active);
        assert!(!stats.is_suspended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_track_last_detection() {
        let h = harness();
        h.detector.start();
        h.recognizer.emit(phrase("phoenix", 0.7));
        settle().await;

        tokio::time::advance(Duration::from_millis(250)).await;
        let stats = h.detector.stats();
        assert!(stats.last_detection_ms.is_some());
        assert!(stats.since_last_detection_ms.unwrap() >= 250);
    }

    #[tokio::test]
    async fn test_unsupported_environment() {
        let env = Environment::new();
        assert!(!WakeWordDetector::is_supported(&env));

        let detector = WakeWordDetector::new(&env, &WakeWordConfig::default());
        detector.start();
        assert!(!detector.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_event_published() {
        let (tx, mut rx) = broadcast::channel(16);
        let h = harness();
        let detector = h.detector.with_events(tx);
        detector.start();

        h.recognizer.emit(phrase("hey phoenix", 0.95));
        settle().await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            VoiceEvent::WakeWordDetected { .. }
        ));
    }
}
