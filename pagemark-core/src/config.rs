//! Configuration loading for Pagemark.
//!
//! All fields are required; the file is validated after parsing.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PAGEMARK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderConfig {
    pub api_base_url: String,
    pub progress_endpoint: String,
    pub activity_endpoint: String,
    pub request_timeout_ms: u64,
    pub channel_timeout_ms: u64,
    pub store_path: PathBuf,
    pub activity: ActivityLimits,
}

/// Plausible reading speeds, in words per minute.
///
/// Samples at or above `max_wpm` are discarded; samples below `min_wpm`
/// have their duration stretched to exactly `min_wpm`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityLimits {
    pub min_wpm: f64,
    pub max_wpm: f64,
}

impl Default for ActivityLimits {
    fn default() -> Self {
        Self {
            min_wpm: 100.0,
            max_wpm: 2000.0,
        }
    }
}

impl ReaderConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.progress_endpoint.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "progress_endpoint",
                reason: "must be an absolute path".to_string(),
            });
        }
        if !self.activity_endpoint.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "activity_endpoint",
                reason: "must be an absolute path".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.channel_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channel_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.activity.min_wpm <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "activity.min_wpm",
                reason: "must be > 0".to_string(),
            });
        }
        if self.activity.max_wpm <= self.activity.min_wpm {
            return Err(ConfigError::InvalidValue {
                field: "activity.max_wpm",
                reason: "must be > activity.min_wpm".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
