//! In-process fakes for platform backends

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::backend::{
    BrowserEvent, BrowserRecognizer, BrowserSpeechApi, EventSink, NativeBridge, NativeEvent,
    NativeSpeechPlugin, NativeStartOptions, PermissionState, RecognitionOptions, SpeechError,
};

pub struct FakeNativePlugin {
    permission: Mutex<Result<PermissionState, SpeechError>>,
    pub permission_requests: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_stop: AtomicBool,
    pub last_start: Mutex<Option<NativeStartOptions>>,
    listeners: Mutex<Vec<EventSink<NativeEvent>>>,
}

impl FakeNativePlugin {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(Ok(PermissionState::Granted)),
            permission_requests: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_stop: AtomicBool::new(false),
            last_start: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn set_permission(&self, permission: Result<PermissionState, SpeechError>) {
        *self.permission.lock().unwrap() = permission;
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn emit(&self, event: NativeEvent) {
        for sink in self.listeners.lock().unwrap().iter() {
            let _ = sink.send(event.clone());
        }
    }
}

#[async_trait]
impl NativeSpeechPlugin for FakeNativePlugin {
    async fn request_permissions(&self) -> Result<PermissionState, SpeechError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.lock().unwrap().clone()
    }

    async fn start(&self, options: NativeStartOptions) -> Result<(), SpeechError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_start.lock().unwrap() = Some(options);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SpeechError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(SpeechError::Backend("stop failed".into()));
        }
        Ok(())
    }

    fn add_listeners(&self, events: EventSink<NativeEvent>) {
        self.listeners.lock().unwrap().push(events);
    }

    fn remove_all_listeners(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

pub struct FakeNativeBridge {
    platform: String,
    plugin: Option<Arc<FakeNativePlugin>>,
}

impl FakeNativeBridge {
    pub fn new(platform: &str, plugin: Option<Arc<FakeNativePlugin>>) -> Self {
        Self {
            platform: platform.to_string(),
            plugin,
        }
    }

    pub fn ios() -> Self {
        Self::new("ios", Some(FakeNativePlugin::granted()))
    }
}

impl NativeBridge for FakeNativeBridge {
    fn platform(&self) -> String {
        self.platform.clone()
    }

    fn speech_plugin(&self) -> Option<Arc<dyn NativeSpeechPlugin>> {
        self.plugin
            .clone()
            .map(|plugin| plugin as Arc<dyn NativeSpeechPlugin>)
    }
}

pub struct FakeRecognizer {
    pub options: RecognitionOptions,
    events: EventSink<BrowserEvent>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
}

impl FakeRecognizer {
    pub fn emit(&self, event: BrowserEvent) {
        let _ = self.events.send(event);
    }
}

impl BrowserRecognizer for FakeRecognizer {
    fn start(&self) -> Result<(), SpeechError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(SpeechError::Backend("start failed".into()));
        }
        self.emit(BrowserEvent::Start);
        Ok(())
    }

    fn stop(&self) -> Result<(), SpeechError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(SpeechError::Backend("stop failed".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBrowserApi {
    recognizers: Mutex<Vec<Arc<FakeRecognizer>>>,
}

impl FakeBrowserApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.recognizers.lock().unwrap().len()
    }

    pub fn latest(&self) -> Arc<FakeRecognizer> {
        Arc::clone(self.recognizers.lock().unwrap().last().unwrap())
    }
}

impl BrowserSpeechApi for FakeBrowserApi {
    fn create_recognizer(
        &self,
        options: &RecognitionOptions,
        events: EventSink<BrowserEvent>,
    ) -> Result<Arc<dyn BrowserRecognizer>, SpeechError> {
        let recognizer = Arc::new(FakeRecognizer {
            options: options.clone(),
            events,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
        });
        self.recognizers.lock().unwrap().push(Arc::clone(&recognizer));
        Ok(recognizer)
    }
}
