//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::speech::RecognitionOptions;
use crate::wake::WakeWordConfig;

/// Tunable settings read from `settings.json` in the data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Options for voice-command listening sessions
    pub speech: RecognitionOptions,

    /// Wake phrases and confidence threshold
    pub wake_word: WakeWordConfig,

    /// Start wake-word detection at launch
    pub wake_word_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speech: RecognitionOptions::default(),
            wake_word: WakeWordConfig::default(),
            wake_word_enabled: true,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub settings: Settings,
}

impl Config {
    /// Load configuration from environment and defaults
    ///
    /// `PHOENIX_DATA_DIR` overrides the default `~/.local/share/phoenix`.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("PHOENIX_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var("HOME").context("HOME is not set")?;
                PathBuf::from(home).join(".local").join("share").join("phoenix")
            }
        };
        Self::from_data_dir(data_dir)
    }

    /// Build configuration rooted at `data_dir`
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let settings = Self::read_settings(&data_dir.join("settings.json"))?;

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            settings,
        })
    }

    fn read_settings(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    /// File holding the persisted interaction mode
    pub fn mode_store_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_data_dir(dir.path()).unwrap();

        assert_eq!(config.socket_path, dir.path().join("daemon.sock"));
        assert_eq!(config.mode_store_path(), dir.path().join("preferences.json"));
        assert_eq!(config.settings, Settings::default());
        assert!(config.settings.wake_word_enabled);
    }

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"wake_word":{"confidence_threshold":0.75},"wake_word_enabled":false}"#,
        )
        .unwrap();

        let config = Config::from_data_dir(dir.path()).unwrap();
        assert!(!config.settings.wake_word_enabled);
        assert_eq!(config.settings.wake_word.confidence_threshold, 0.75);
        assert_eq!(config.settings.wake_word.wake_words.len(), 3);
        assert_eq!(config.settings.speech.language, "en-US");
    }

    #[test]
    fn test_invalid_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{").unwrap();
        assert!(Config::from_data_dir(dir.path()).is_err());
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_data_dir(dir.path().join("nested")).unwrap();
        config.ensure_dirs().unwrap();
        assert!(config.data_dir.is_dir());
    }
}
