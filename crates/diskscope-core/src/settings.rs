/// User-facing scan and display preferences.
///
/// The engine only ever *reads* settings through [`SettingsProvider`];
/// writing them belongs to whatever shell hosts the engine.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Flat record of preferences, stored as key-value JSON by the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Re-scan cached paths once they are older than `refresh_interval_secs`.
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Paths never measured. Matched after normalisation, including descendants.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_theme() -> String {
    "dark".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_refresh: false,
            refresh_interval_secs: default_refresh_interval(),
            excluded_paths: Vec::new(),
            show_hidden: false,
            theme: default_theme(),
        }
    }
}

impl Settings {
    /// Maximum age of a cache entry before it is considered stale, or `None`
    /// if cached results never expire.
    pub fn max_cache_age(&self) -> Option<Duration> {
        self.auto_refresh
            .then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    /// Load settings from a JSON file. A missing file yields defaults;
    /// unknown keys are ignored.
    pub fn load_json(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(EngineError::io(path, err)),
        }
    }
}

/// Read-only source of the current settings.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Settings;
}

/// Fixed settings, handy for tests and one-shot CLI runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub Settings);

impl SettingsProvider for StaticSettings {
    fn settings(&self) -> Settings {
        self.0.clone()
    }
}

/// Settings shared with a shell that may change them at runtime.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Replace the settings wholesale. Only the owning shell calls this.
    pub fn update(&self, settings: Settings) {
        *self.inner.write() = settings;
    }
}

impl SettingsProvider for SharedSettings {
    fn settings(&self) -> Settings {
        self.inner.read().clone()
    }
}
