//! Settings file location and lifecycle
//!
//! Resolves the platform configuration directory, loads the config file if
//! present and falls back to defaults otherwise.

use crate::config::Config;
use crate::error::{ConfigError, SettingsError, SettingsResult};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "dispensekit";
const CONFIG_FILE: &str = "config.toml";

/// Owns the loaded configuration and the file it came from
#[derive(Debug, Clone)]
pub struct SettingsManager {
    path: PathBuf,
    config: Config,
}

impl SettingsManager {
    /// Platform configuration directory for this application
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| {
                ConfigError::UnsupportedPlatform("no configuration directory".to_string()).into()
            })
    }

    /// Default location of the config file
    pub fn config_file_path() -> SettingsResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Platform data directory for this application
    pub fn default_data_dir() -> SettingsResult<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| {
                ConfigError::UnsupportedPlatform("no data directory".to_string()).into()
            })
    }

    /// Load from the default location
    pub fn load_default() -> SettingsResult<Self> {
        Self::load_from(Self::config_file_path()?)
    }

    /// Load from `path`; a missing file yields the default configuration
    pub fn load_from(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let config = if path.exists() {
            tracing::debug!("Loading settings from {}", path.display());
            Config::load_from_file(&path)?
        } else {
            tracing::debug!("No settings at {}, using defaults", path.display());
            Config::default()
        };
        Ok(Self { path, config })
    }

    /// Write the configuration back to its file
    pub fn save(&self) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        self.config.save_to_file(&self.path)?;
        tracing::info!("Settings saved to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Directory for local data, configured or platform default
    pub fn data_dir(&self) -> SettingsResult<PathBuf> {
        match &self.config.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }
}
