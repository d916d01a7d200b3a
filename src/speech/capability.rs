//! Runtime capability detection

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::backend::{BrowserSpeechApi, NativeBridge, NativeSpeechPlugin};

/// Platform the shim recognizes speech on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    IosNative,
    WebBrowser,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::IosNative => write!(f, "ios-native"),
            Platform::WebBrowser => write!(f, "web-browser"),
        }
    }
}

/// The platform facilities available to this process
///
/// Built once by the composition root and handed to every component that
/// needs speech; nothing inspects ambient globals after that.
#[derive(Clone, Default)]
pub struct Environment {
    native_bridge: Option<Arc<dyn NativeBridge>>,
    browser_speech: Option<Arc<dyn BrowserSpeechApi>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native_bridge(mut self, bridge: Arc<dyn NativeBridge>) -> Self {
        self.native_bridge = Some(bridge);
        self
    }

    pub fn with_browser_speech(mut self, api: Arc<dyn BrowserSpeechApi>) -> Self {
        self.browser_speech = Some(api);
        self
    }

    pub fn native_bridge(&self) -> Option<&Arc<dyn NativeBridge>> {
        self.native_bridge.as_ref()
    }

    pub fn native_speech_plugin(&self) -> Option<Arc<dyn NativeSpeechPlugin>> {
        self.native_bridge.as_ref()?.speech_plugin()
    }

    pub fn browser_speech(&self) -> Option<&Arc<dyn BrowserSpeechApi>> {
        self.browser_speech.as_ref()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("native_bridge", &self.native_bridge.as_ref().map(|b| b.platform()))
            .field("browser_speech", &self.browser_speech.is_some())
            .finish()
    }
}

/// Capabilities detected once per shim instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformCapability {
    pub is_native_runtime: bool,
    pub is_native_ios: bool,
    pub platform: Platform,
}

impl PlatformCapability {
    pub fn detect(env: &Environment) -> Self {
        let is_native_runtime = env.native_bridge().is_some();
        let is_native_ios = env
            .native_bridge()
            .is_some_and(|bridge| bridge.platform() == "ios");

        Self {
            is_native_runtime,
            is_native_ios,
            platform: if is_native_ios {
                Platform::IosNative
            } else {
                Platform::WebBrowser
            },
        }
    }
}

/// Platform summary reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub is_native_runtime: bool,
    pub is_native_ios: bool,
    pub platform: Platform,
    pub speech_api: String,
    pub cost: String,
}

impl From<PlatformCapability> for PlatformInfo {
    fn from(capability: PlatformCapability) -> Self {
        let speech_api = match capability.platform {
            Platform::IosNative => "SFSpeechRecognizer (Apple)",
            Platform::WebBrowser => "Web Speech API",
        };
        Self {
            is_native_runtime: capability.is_native_runtime,
            is_native_ios: capability.is_native_ios,
            platform: capability.platform,
            speech_api: speech_api.to_string(),
            cost: "FREE".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::testing::{FakeBrowserApi, FakeNativeBridge};

    #[test]
    fn test_ios_bridge_detected() {
        let env = Environment::new().with_native_bridge(Arc::new(FakeNativeBridge::ios()));
        let capability = PlatformCapability::detect(&env);
        assert!(capability.is_native_runtime);
        assert!(capability.is_native_ios);
        assert_eq!(capability.platform, Platform::IosNative);
    }

    #[test]
    fn test_android_bridge_is_not_ios() {
        let env =
            Environment::new().with_native_bridge(Arc::new(FakeNativeBridge::new("android", None)));
        let capability = PlatformCapability::detect(&env);
        assert!(capability.is_native_runtime);
        assert!(!capability.is_native_ios);
        assert_eq!(capability.platform, Platform::WebBrowser);
    }

    #[test]
    fn test_browser_only() {
        let env = Environment::new().with_browser_speech(Arc::new(FakeBrowserApi::new()));
        let info = PlatformInfo::from(PlatformCapability::detect(&env));
        assert!(!info.is_native_runtime);
        assert_eq!(info.platform, Platform::WebBrowser);
        assert_eq!(info.speech_api, "Web Speech API");
        assert_eq!(info.cost, "FREE");
    }

    #[test]
    fn test_platform_serialization() {
        let json = serde_json::to_string(&Platform::IosNative).unwrap();
        assert_eq!(json, r#""ios-native""#);
    }
}
