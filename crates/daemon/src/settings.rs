//! Persistent runtime settings.
//!
//! A small JSON key-value file holding toggles changed at runtime through the
//! control channel, such as whether the transfer service is enabled. The
//! store persists to `data_dir/settings.json` by default.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// Key of the durable enabled flag for the transfer service.
pub const FTP_ENABLED_KEY: &str = "ftp_enabled";

/// Thread-safe JSON settings store.
#[derive(Debug)]
pub struct Settings {
    /// The path to the JSON file.
    path: PathBuf,
    /// Current values.
    data: RwLock<Map<String, Value>>,
}

impl Settings {
    /// Creates an empty store that will persist to the given path.
    ///
    /// This does not read the file; call `load()` for that.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            data: RwLock::new(Map::new()),
        }
    }

    /// Creates a store and loads it from `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Self::new(path);
        settings.load()?;
        Ok(settings)
    }

    /// Returns the path to the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings from the JSON file.
    ///
    /// A missing file yields an empty store. A file that does not hold a
    /// JSON object is logged and also yields an empty store, so a corrupt
    /// file never prevents the daemon from starting.
    pub fn load(&self) -> Result<()> {
        let loaded = if self.path.exists() {
            let contents = fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read settings: {}", self.path.display()))?;
            match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(map) => map,
                Err(e) => {
                    tracing::error!("Error decoding settings json {:?}: {}", self.path, e);
                    Map::new()
                }
            }
        } else {
            tracing::debug!("Settings file not found at {:?}, starting empty", self.path);
            Map::new()
        };

        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on settings"))?;
        *data = loaded;
        Ok(())
    }

    /// Saves the settings to the JSON file.
    ///
    /// Uses atomic write (write to temp file, then rename).
    /// Creates parent directories if they don't exist.
    pub fn save(&self) -> Result<()> {
        let data = self
            .data
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on settings"))?;
        self.write_file(&data)
    }

    /// Sets `key` and persists it. Memory is only updated once the file
    /// has been written, so a failed save leaves the store unchanged.
    pub fn persist(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on settings"))?;

        let mut updated = data.clone();
        updated.insert(key.into(), value.into());
        self.write_file(&updated)?;

        *data = updated;
        Ok(())
    }

    fn write_file(&self, data: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(data).context("Failed to serialize settings")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write temp settings: {}", temp_path.display())
        })?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp settings {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved {} settings to {:?}", data.len(), self.path);
        Ok(())
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().ok()?.get(key).cloned()
    }

    /// Returns the boolean under `key`, or `default` when absent or not a bool.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Sets `key` in memory. Call `save()` to persist.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on settings"))?;
        data.insert(key.into(), value.into());
        Ok(())
    }

    /// Whether the transfer service is enabled. Defaults to `true`.
    pub fn ftp_enabled(&self) -> bool {
        self.get_bool(FTP_ENABLED_KEY, true)
    }

    /// Set and persist the enabled flag.
    pub fn set_ftp_enabled(&self, enabled: bool) -> Result<()> {
        self.persist(FTP_ENABLED_KEY, enabled)
    }
}
