//! Durable storage for the mode preference

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::warn;

use super::machine::InteractionMode;

/// Key under which the mode preference is stored
pub const MODE_STORAGE_KEY: &str = "phoenixMode";

/// Per-device key/value storage holding the persisted mode
pub trait ModeStore: Send {
    /// Read the raw persisted value, if any
    fn load(&self) -> Result<Option<String>>;

    /// Persist the given mode
    fn save(&mut self, mode: InteractionMode) -> Result<()>;
}

/// Mode store backed by a JSON object file
#[derive(Debug, Clone)]
pub struct FileModeStore {
    path: PathBuf,
}

impl FileModeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed preferences in {}", self.path.display()))
    }
}

impl ModeStore for FileModeStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .read_all()?
            .remove(MODE_STORAGE_KEY)
            .map(|value| match value {
                Value::String(raw) => raw,
                other => other.to_string(),
            }))
    }

    fn save(&mut self, mode: InteractionMode) -> Result<()> {
        let mut values = self.read_all().unwrap_or_else(|e| {
            warn!(?e, path = %self.path.display(), "replacing unreadable preferences");
            Map::new()
        });
        values.insert(
            MODE_STORAGE_KEY.to_string(),
            Value::String(mode.as_str().to_string()),
        );

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("failed to create preferences directory")?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&values)?)
            .context("failed to write preferences")?;
        std::fs::rename(&tmp, &self.path).context("failed to replace preferences")?;
        Ok(())
    }
}

/// In-memory store; clones share the same map
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryModeStore {
    values: std::sync::Arc<std::sync::Mutex<std::collections::BTreeMap<String, String>>>,
}

#[cfg(test)]
impl MemoryModeStore {
    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[cfg(test)]
impl ModeStore for MemoryModeStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.get(MODE_STORAGE_KEY))
    }

    fn save(&mut self, mode: InteractionMode) -> Result<()> {
        self.insert(MODE_STORAGE_KEY, mode.as_str());
        Ok(())
    }
}
