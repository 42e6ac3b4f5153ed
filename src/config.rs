//! Client configuration for recognition-link.
//!
//! This covers how the client reaches the gateway and how it presents
//! results. The device configuration itself lives on the device side and is
//! never written here.

use crate::core::{MAX_WINDOW_LENGTH, MIN_WINDOW_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the recognition gateway
    pub gateway_url: String,

    /// Default sliding window length for result streams
    pub window_length: usize,

    /// Timeout for gateway requests
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:5000".to_string(),
            window_length: 1,
            request_timeout: Duration::from_secs(10),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults if it is missing.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        self.validate()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recognition-link")
            .join("config.json")
    }

    /// Set the default window length, leaving the config untouched when out of range.
    pub fn set_window_length(&mut self, length: usize) -> Result<(), ConfigError> {
        check_window_length(length)?;
        self.window_length = length;
        Ok(())
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_window_length(self.window_length)?;
        if self.gateway_url.trim().is_empty() {
            return Err(ConfigError::Invalid("gateway_url is empty".to_string()));
        }
        Ok(())
    }
}

fn check_window_length(length: usize) -> Result<(), ConfigError> {
    if (MIN_WINDOW_LENGTH..=MAX_WINDOW_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "window_length must be between {MIN_WINDOW_LENGTH} and {MAX_WINDOW_LENGTH}, got {length}"
        )))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
