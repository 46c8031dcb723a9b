use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::{Config, CoordinatorConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/paginationable/config.toml` on Unix/macOS,
    /// or equivalent on other platforms via `dirs::config_dir()`.
    /// Falls back to current directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("paginationable").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Config::default());
        }

        Self::load_from(&path)
    }

    /// Loads and validates configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;

        if self.transport.base_url.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "transport.base_url must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

impl CoordinatorConfig {
    /// Validates the coordinator settings.
    ///
    /// Checks:
    /// - The endpoint is set
    /// - The page size is at least 1
    /// - Loader names are non-empty and distinct
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "coordinator.endpoint must not be empty".to_string(),
            });
        }

        if self.per_page == 0 {
            return Err(ConfigError::ValidationError {
                message: "coordinator.per_page must be at least 1".to_string(),
            });
        }

        if self.loader.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "coordinator.loader must not be empty".to_string(),
            });
        }

        let search_loader = self.search_loader_name();
        if search_loader == self.loader {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Browse and search loaders must differ, both are '{}'",
                    self.loader
                ),
            });
        }

        if self.search_key.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "coordinator.search_key must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
