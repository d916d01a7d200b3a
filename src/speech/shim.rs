//! Platform speech recognition shim
//!
//! One start/stop/callback contract over the native plugin and the browser
//! recognizer. Native recognition is preferred: on a native iOS host every
//! start re-runs initialization so a previously failed native setup can
//! recover.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::VoiceEvent;

use super::backend::{
    BrowserEvent, BrowserRecognizer, EventSink, NativeEvent, NativeSpeechPlugin,
    NativeStartOptions, PermissionState, RecognitionOptions, RecognitionResult, ResultBatch,
    SpeechError,
};
use super::capability::{Environment, Platform, PlatformCapability, PlatformInfo};

/// Which backend a listening session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveBackend {
    NativePlugin,
    BrowserApi,
    None,
}

/// Snapshot of the shim's recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSession {
    pub is_listening: bool,
    pub active_backend: ActiveBackend,
}

/// Successful initialization report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    pub success: bool,
    pub platform: Platform,
}

type ResultCallback = Arc<dyn Fn(RecognitionResult) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;
type EndCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
enum BoundBackend {
    Native(Arc<dyn NativeSpeechPlugin>),
    Browser(Arc<dyn BrowserRecognizer>),
}

impl BoundBackend {
    fn kind(&self) -> ActiveBackend {
        match self {
            BoundBackend::Native(_) => ActiveBackend::NativePlugin,
            BoundBackend::Browser(_) => ActiveBackend::BrowserApi,
        }
    }
}

#[derive(Default)]
struct Session {
    bound: Option<BoundBackend>,
    is_listening: bool,
}

#[derive(Default)]
struct Callbacks {
    on_result: Option<ResultCallback>,
    on_error: Option<ErrorCallback>,
    on_end: Option<EndCallback>,
}

/// State shared with the event pump
struct Shared {
    /// Held for the whole of every start/stop, serializing them
    session: tokio::sync::Mutex<Session>,
    callbacks: Mutex<Callbacks>,
    event_tx: OnceLock<broadcast::Sender<VoiceEvent>>,
}

impl Shared {
    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: VoiceEvent) {
        if let Some(tx) = self.event_tx.get() {
            let _ = tx.send(event);
        }
    }

    fn emit_result(&self, result: RecognitionResult) {
        let callback = self.callbacks().on_result.clone();
        if let Some(callback) = callback {
            callback(result);
        }
    }

    fn emit_error(&self, code: String) {
        self.publish(VoiceEvent::RecognitionError { code: code.clone() });
        let callback = self.callbacks().on_error.clone();
        if let Some(callback) = callback {
            callback(code);
        }
    }

    async fn finish_session(&self) {
        let was_listening = {
            let mut session = self.session.lock().await;
            std::mem::replace(&mut session.is_listening, false)
        };
        if was_listening {
            debug!("recognition session ended by backend");
            self.publish(VoiceEvent::ListeningStopped);
        }
        let callback = self.callbacks().on_end.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    async fn handle_native_event(&self, event: NativeEvent) {
        match event {
            NativeEvent::PartialResults { matches } => {
                if let Some(result) = normalize_native_partial(&matches) {
                    self.emit_result(result);
                }
            }
            NativeEvent::ListeningState { listening: false } => self.finish_session().await,
            NativeEvent::ListeningState { listening: true } => {
                debug!("native recognizer listening");
            }
        }
    }

    async fn handle_browser_event(&self, event: BrowserEvent) {
        match event {
            BrowserEvent::Start => debug!("browser recognizer started"),
            BrowserEvent::Result(batch) => {
                if let Some(result) = normalize_browser_result(&batch) {
                    self.emit_result(result);
                }
            }
            BrowserEvent::Error { error } => {
                error!(code = %error, "browser speech recognition error");
                self.emit_error(error);
            }
            BrowserEvent::End => self.finish_session().await,
        }
    }
}

/// Latest result, top alternative
fn normalize_browser_result(batch: &ResultBatch) -> Option<RecognitionResult> {
    let result = batch.results.last()?;
    let best = result.alternatives.first()?;
    Some(RecognitionResult {
        transcript: best.transcript.clone(),
        is_final: result.is_final,
        confidence: best.confidence,
    })
}

/// Native partial results carry no confidence
fn normalize_native_partial(matches: &[String]) -> Option<RecognitionResult> {
    matches.first().map(|transcript| RecognitionResult {
        transcript: transcript.clone(),
        is_final: false,
        confidence: 1.0,
    })
}

async fn pump_events(
    shared: Arc<Shared>,
    mut native_rx: mpsc::UnboundedReceiver<NativeEvent>,
    mut browser_rx: mpsc::UnboundedReceiver<BrowserEvent>,
) {
    loop {
        tokio::select! {
            Some(event) = native_rx.recv() => shared.handle_native_event(event).await,
            Some(event) = browser_rx.recv() => shared.handle_browser_event(event).await,
            else => break,
        }
    }
}

/// Speech recognition over whichever backend the platform provides
///
/// Must be created inside a Tokio runtime; backend events are dispatched to
/// the registered callbacks from a background task.
pub struct PlatformSpeechRecognition {
    env: Environment,
    capability: PlatformCapability,
    shared: Arc<Shared>,
    native_tx: EventSink<NativeEvent>,
    browser_tx: EventSink<BrowserEvent>,
    pump: JoinHandle<()>,
}

impl PlatformSpeechRecognition {
    pub fn new(env: Environment) -> Self {
        let capability = PlatformCapability::detect(&env);
        info!(
            native_runtime = capability.is_native_runtime,
            native_ios = capability.is_native_ios,
            "speech platform detected"
        );

        let shared = Arc::new(Shared {
            session: tokio::sync::Mutex::new(Session::default()),
            callbacks: Mutex::new(Callbacks::default()),
            event_tx: OnceLock::new(),
        });
        let (native_tx, native_rx) = mpsc::unbounded_channel();
        let (browser_tx, browser_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_events(Arc::clone(&shared), native_rx, browser_rx));

        Self {
            env,
            capability,
            shared,
            native_tx,
            browser_tx,
            pump,
        }
    }

    /// Publish listening transitions and errors on the given channel
    pub fn with_events(self, event_tx: broadcast::Sender<VoiceEvent>) -> Self {
        let _ = self.shared.event_tx.set(event_tx);
        self
    }

    pub fn capability(&self) -> PlatformCapability {
        self.capability
    }

    pub fn platform_info(&self) -> PlatformInfo {
        self.capability.into()
    }

    pub fn on_result(&self, callback: impl Fn(RecognitionResult) + Send + Sync + 'static) {
        self.shared.callbacks().on_result = Some(Arc::new(callback));
    }

    pub fn on_error(&self, callback: impl Fn(String) + Send + Sync + 'static) {
        self.shared.callbacks().on_error = Some(Arc::new(callback));
    }

    pub fn on_end(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks().on_end = Some(Arc::new(callback));
    }

    pub async fn is_listening(&self) -> bool {
        self.shared.session.lock().await.is_listening
    }

    pub async fn session(&self) -> RecognitionSession {
        let session = self.shared.session.lock().await;
        let active_backend = match (&session.bound, session.is_listening) {
            (Some(bound), true) => bound.kind(),
            _ => ActiveBackend::None,
        };
        RecognitionSession {
            is_listening: session.is_listening,
            active_backend,
        }
    }

    /// Bind the backend selected by the platform
    pub async fn initialize(
        &self,
        options: &RecognitionOptions,
    ) -> Result<InitOutcome, SpeechError> {
        let mut session = self.shared.session.lock().await;
        self.initialize_locked(&mut session, options).await
    }

    async fn initialize_locked(
        &self,
        session: &mut Session,
        options: &RecognitionOptions,
    ) -> Result<InitOutcome, SpeechError> {
        let outcome = if self.capability.is_native_ios {
            self.bind_native(session).await
        } else {
            self.bind_browser(session, options)
        };
        if let Err(e) = &outcome {
            error!(error = %e, "failed to initialize speech recognition");
        }
        outcome
    }

    async fn bind_native(&self, session: &mut Session) -> Result<InitOutcome, SpeechError> {
        debug!("initializing native speech recognition");
        let plugin = self
            .env
            .native_speech_plugin()
            .ok_or(SpeechError::PluginMissing)?;

        let permission = plugin.request_permissions().await?;
        if permission != PermissionState::Granted {
            debug!(?permission, "native speech permission not granted");
            return Err(SpeechError::PermissionDenied);
        }

        session.bound = Some(BoundBackend::Native(plugin));
        info!(platform = %Platform::IosNative, "speech recognizer ready");
        Ok(InitOutcome {
            success: true,
            platform: Platform::IosNative,
        })
    }

    fn bind_browser(
        &self,
        session: &mut Session,
        options: &RecognitionOptions,
    ) -> Result<InitOutcome, SpeechError> {
        debug!(language = %options.language, "initializing browser speech recognition");
        let api = self
            .env
            .browser_speech()
            .ok_or(SpeechError::NotSupported)?;
        let recognizer = api.create_recognizer(options, self.browser_tx.clone())?;

        session.bound = Some(BoundBackend::Browser(recognizer));
        info!(platform = %Platform::WebBrowser, "speech recognizer ready");
        Ok(InitOutcome {
            success: true,
            platform: Platform::WebBrowser,
        })
    }

    /// Start a listening session. A no-op while already listening.
    pub async fn start_listening(&self, options: &RecognitionOptions) -> Result<(), SpeechError> {
        let mut session = self.shared.session.lock().await;
        if session.is_listening {
            debug!("already listening");
            return Ok(());
        }

        if self.capability.is_native_ios {
            debug!("attempting native speech initialization");
            if let Err(e) = self.initialize_locked(&mut session, options).await {
                warn!(error = %e, "native speech unavailable, using fallback");
                if session.bound.is_none() && self.env.browser_speech().is_some() {
                    self.bind_browser(&mut session, options)?;
                }
            }
        } else if session.bound.is_none() {
            self.initialize_locked(&mut session, options).await?;
        }

        let Some(backend) = session.bound.clone() else {
            error!("no speech backend bound, cannot start listening");
            return Err(SpeechError::NoBackendAvailable);
        };

        let started = match &backend {
            BoundBackend::Native(plugin) => {
                plugin.remove_all_listeners();
                plugin.add_listeners(self.native_tx.clone());
                plugin.start(NativeStartOptions::from(options)).await
            }
            BoundBackend::Browser(recognizer) => recognizer.start(),
        };
        if let Err(e) = started {
            error!(backend = ?backend.kind(), error = %e, "failed to start listening");
            return Err(e);
        }

        session.is_listening = true;
        info!(backend = ?backend.kind(), "listening started");
        self.shared.publish(VoiceEvent::ListeningStarted {
            backend: backend.kind(),
        });
        Ok(())
    }

    /// Stop the current session. Always leaves the shim not listening.
    pub async fn stop_listening(&self) {
        let mut session = self.shared.session.lock().await;
        if !session.is_listening {
            return;
        }

        let stopped = match &session.bound {
            Some(BoundBackend::Native(plugin)) => plugin.stop().await,
            Some(BoundBackend::Browser(recognizer)) => recognizer.stop(),
            None => Ok(()),
        };
        match stopped {
            Ok(()) => info!("listening stopped"),
            Err(e) => error!(error = %e, "failed to stop listening"),
        }

        session.is_listening = false;
        self.shared.publish(VoiceEvent::ListeningStopped);
    }
}

impl Drop for PlatformSpeechRecognition {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
