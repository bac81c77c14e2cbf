//! Configuration and settings management for DispenseKit
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into logical sections:
//! - Device endpoints and request timing
//! - Compiled-in slot defaults
//! - Local storage locations
//! - Logging output

use crate::error::{ConfigError, SettingsError, SettingsResult};
use dispensekit_core::{slots_from_counts, SlotRecord, COUNT_SANITY_CEILING, DEFAULT_SLOT_COUNTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dispenser endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Base URL of the HTTP endpoints
    pub base_url: String,
    /// URL of the WebSocket push channel
    pub push_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Servo angle sent with each dispense
    pub dispense_angle: u16,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.0.107".to_string(),
            push_url: "ws://192.168.0.107:81/".to_string(),
            request_timeout_ms: 5000,
            dispense_angle: 90,
        }
    }
}

/// Slots shown before the device reports its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotSettings {
    /// Starting count of each slot, slot 1 first
    pub default_counts: Vec<u32>,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            default_counts: DEFAULT_SLOT_COUNTS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for local data; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Key of the operator profile record
    pub profiles_key: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            profiles_key: "operator_profiles".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".to_string(),
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Device endpoints
    pub device: DeviceSettings,
    /// Slot defaults
    pub slots: SlotSettings,
    /// Local storage
    pub storage: StorageSettings,
    /// Logging output
    pub logging: LoggingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| SettingsError::SaveError(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;
        if !(device.base_url.starts_with("http://") || device.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                key: "device.base_url".to_string(),
                url: device.base_url.clone(),
            });
        }

        if !(device.push_url.starts_with("ws://") || device.push_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl {
                key: "device.push_url".to_string(),
                url: device.push_url.clone(),
            });
        }

        if device.request_timeout_ms == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "device.request_timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if device.dispense_angle > 180 {
            return Err(ConfigError::ValueOutOfRange {
                key: "device.dispense_angle".to_string(),
                value: device.dispense_angle.to_string(),
            });
        }

        if self.slots.default_counts.is_empty() {
            return Err(ConfigError::MissingKey("slots.default_counts".to_string()));
        }

        if let Some(count) = self
            .slots
            .default_counts
            .iter()
            .find(|c| **c > COUNT_SANITY_CEILING)
        {
            return Err(ConfigError::ValueOutOfRange {
                key: "slots.default_counts".to_string(),
                value: count.to_string(),
            });
        }

        let key = &self.storage.profiles_key;
        if key.is_empty() {
            return Err(ConfigError::MissingKey("storage.profiles_key".to_string()));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::ValueOutOfRange {
                key: "storage.profiles_key".to_string(),
                value: key.clone(),
            });
        }

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::MissingKey("logging.filter".to_string()));
        }

        Ok(())
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.device.request_timeout_ms)
    }

    /// Slots to show until the device reports its own
    pub fn default_slots(&self) -> Vec<SlotRecord> {
        slots_from_counts(&self.slots.default_counts)
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}
