//! Monitor configuration.
//!
//! Reads/writes TOML at `~/.config/minilink/monitor.toml`. The same file
//! holds the stored printer addresses and serves as the registry's
//! preference store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use minilink_devices::{HeartbeatConfig, PreferenceStore, RegistryConfig, StoreError};
use serde::{Deserialize, Serialize};

/// On-disk configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Timeout for commands and manual-add probes, in seconds.
    pub request_timeout_secs: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Send G-code preheat targets after an upload.
    pub apply_preheat: bool,
    /// Comma-separated printer addresses.
    pub manual_instances: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let registry = RegistryConfig::default();
        Self {
            request_timeout_secs: registry.command_timeout.as_secs(),
            heartbeat_interval_ms: millis(registry.heartbeat.interval),
            heartbeat_timeout_ms: millis(registry.heartbeat.timeout),
            apply_preheat: registry.apply_preheat,
            manual_instances: String::new(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl MonitorConfig {
    /// Loads the file at `path`, writing the defaults there first when it
    /// does not exist.
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!(path = %path.display(), "created default configuration");
            return Ok(config);
        }
        Ok(Self::read(path)?)
    }

    fn read(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| StoreError::Backend(e.to_string()))?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(self.heartbeat_interval_ms),
                timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            },
            command_timeout: self.request_timeout(),
            apply_preheat: self.apply_preheat,
            ..Default::default()
        }
    }
}

/// [`PreferenceStore`] backed by the `manual_instances` key of the config
/// file. Every access re-reads the file so other settings are preserved.
#[derive(Debug)]
pub struct ConfigPreferences {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigPreferences {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn current(&self) -> Result<MonitorConfig, StoreError> {
        if self.path.exists() {
            MonitorConfig::read(&self.path)
        } else {
            Ok(MonitorConfig::default())
        }
    }
}

impl PreferenceStore for ConfigPreferences {
    fn load(&self) -> Result<String, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.current()?.manual_instances)
    }

    fn save(&self, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut config = self.current()?;
        config.manual_instances = value.to_string();
        config.save(&self.path)
    }
}

/// `~/.config/minilink/monitor.toml` (or the platform equivalent).
pub fn default_config_path() -> PathBuf {
    config_base_dir().join("minilink").join("monitor.toml")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
