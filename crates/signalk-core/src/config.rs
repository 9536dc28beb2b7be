//! Configuration storage abstraction.
//!
//! The exporter's options (broker connection plus the rule list) are owned
//! by the host and round-tripped verbatim through a save/load contract:
//! - `FileConfigStorage` keeps JSON files under `<dir>/plugin-config-data/`
//! - `MemoryConfigStorage` keeps everything in memory (tests, ephemeral runs)
//!
//! All methods are synchronous; async wrappers live at the framework layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::rules::{default_export_rules, ExportRule};

/// Plugin id used as the storage key for the exporter's options.
pub const PLUGIN_ID: &str = "signalk-mqtt-export";

/// Errors that can occur during configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested configuration was not found.
    NotFound(String),
    /// Failed to read configuration.
    ReadError(String),
    /// Failed to write configuration.
    WriteError(String),
    /// Configuration data is invalid.
    InvalidData(String),
    /// Storage is not available.
    StorageUnavailable(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Configuration not found: {}", key),
            ConfigError::ReadError(msg) => write!(f, "Read error: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Write error: {}", msg),
            ConfigError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            ConfigError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Abstract plugin configuration storage.
pub trait ConfigStorage: Send + Sync {
    /// Load configuration for a specific plugin.
    fn load_plugin_config(&self, plugin_id: &str) -> Result<serde_json::Value, ConfigError>;

    /// Save configuration for a specific plugin.
    fn save_plugin_config(
        &self,
        plugin_id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError>;
}

/// Options of the MQTT export plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    /// Run the exporter at all.
    pub enabled: bool,

    /// Broker URL, e.g. `mqtt://localhost:1883`.
    pub mqtt_broker: String,

    pub mqtt_client_id: String,

    pub mqtt_username: String,

    pub mqtt_password: String,

    /// Prepended to every topic as `<prefix>/`.
    pub topic_prefix: String,

    pub export_rules: Vec<ExportRule>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mqtt_broker: "mqtt://localhost:1883".to_string(),
            mqtt_client_id: "signalk-mqtt-export".to_string(),
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            topic_prefix: String::new(),
            export_rules: default_export_rules(),
        }
    }
}

impl ExportConfig {
    /// Username and password, only when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.mqtt_username.is_empty() || self.mqtt_password.is_empty() {
            None
        } else {
            Some((&self.mqtt_username, &self.mqtt_password))
        }
    }
}

/// Load the exporter options, falling back to defaults when none are stored.
pub fn load_export_config<S: ConfigStorage + ?Sized>(
    storage: &S,
) -> Result<ExportConfig, ConfigError> {
    match storage.load_plugin_config(PLUGIN_ID) {
        Ok(value) => {
            serde_json::from_value(value).map_err(|e| ConfigError::InvalidData(e.to_string()))
        }
        Err(ConfigError::NotFound(_)) => Ok(ExportConfig::default()),
        Err(e) => Err(e),
    }
}

/// Persist the exporter options.
pub fn save_export_config<S: ConfigStorage + ?Sized>(
    storage: &S,
    config: &ExportConfig,
) -> Result<(), ConfigError> {
    let value =
        serde_json::to_value(config).map_err(|e| ConfigError::WriteError(e.to_string()))?;
    storage.save_plugin_config(PLUGIN_ID, &value)
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStorage for MemoryConfigStorage {
    fn load_plugin_config(&self, plugin_id: &str) -> Result<serde_json::Value, ConfigError> {
        let data = self
            .data
            .read()
            .map_err(|e| ConfigError::StorageUnavailable(e.to_string()))?;
        data.get(plugin_id)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(plugin_id.to_string()))
    }

    fn save_plugin_config(
        &self,
        plugin_id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(|e| ConfigError::StorageUnavailable(e.to_string()))?
            .insert(plugin_id.to_string(), config.clone());
        Ok(())
    }
}

/// File-based storage under a SignalK config directory (usually `~/.signalk`).
#[derive(Debug, Clone)]
pub struct FileConfigStorage {
    root: PathBuf,
}

impl FileConfigStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn plugin_path(&self, plugin_id: &str) -> PathBuf {
        self.root
            .join("plugin-config-data")
            .join(format!("{plugin_id}.json"))
    }
}

impl ConfigStorage for FileConfigStorage {
    fn load_plugin_config(&self, plugin_id: &str) -> Result<serde_json::Value, ConfigError> {
        let path = self.plugin_path(plugin_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(ConfigError::ReadError(e.to_string())),
        };
        serde_json::from_str(&text).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    fn save_plugin_config(
        &self,
        plugin_id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        let path = self.plugin_path(plugin_id);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| ConfigError::WriteError(e.to_string()))
    }
}
