use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "DoseKeeper";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DOCUMENT_FILE_NAME: &str = "medications.json";
pub const LOGS_DIR_NAME: &str = "Logs";
pub const DEFAULT_TICK_SECS: u64 = 60;

const ENV_DATA_DIR: &str = "DOSEKEEPER_DATA_DIR";
const ENV_TICK_SECS: &str = "DOSEKEEPER_TICK_SECS";
const ENV_ACTIVITY_LOG: &str = "DOSEKEEPER_ACTIVITY_LOG";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidTick { var: &'static str, value: String },

    #[error("{var} must be a boolean (on/off, true/false, 1/0), got {value:?}")]
    InvalidFlag { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    EmptyPath { var: &'static str },
}

pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "dosekeeper_lib=debug,dosekeeper=debug"
    } else {
        "dosekeeper_lib=info,dosekeeper=info"
    }
}

/// Get the application data directory
/// ~/DoseKeeper/ on all platforms, falling back to the working directory
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Engine settings, resolved once at startup and passed to constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub activity_log_enabled: bool,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            tick_interval: Duration::from_secs(DEFAULT_TICK_SECS),
            activity_log_enabled: true,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match lookup(ENV_DATA_DIR) {
            Some(dir) if dir.trim().is_empty() => {
                return Err(ConfigError::EmptyPath { var: ENV_DATA_DIR })
            }
            Some(dir) => PathBuf::from(dir.trim()),
            None => app_data_dir(),
        };
        let mut config = Self::new(data_dir);

        if let Some(raw) = lookup(ENV_TICK_SECS) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidTick {
                    var: ENV_TICK_SECS,
                    value: raw.clone(),
                })?;
            config.tick_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_ACTIVITY_LOG) {
            config.activity_log_enabled = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidFlag {
                        var: ENV_ACTIVITY_LOG,
                        value: raw,
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(DOCUMENT_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR_NAME)
    }
}
