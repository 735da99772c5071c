//! Configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`LoggerConfig::default()`)
//! 2. `config/sensor_logger.toml` (or a file passed with `--config`)
//! 3. Environment variables prefixed with `SENSOR_LOGGER_`, sections separated
//!    by a double underscore
//!
//! # Example
//! ```no_run
//! use sensor_logger::config::LoggerConfig;
//!
//! let config = LoggerConfig::load()?;
//! config.validate()?;
//! println!("Default endpoint: {}", config.connection.default_url);
//! # Ok::<(), sensor_logger::error::LoggerError>(())
//! ```

use crate::error::{AppResult, LoggerError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/sensor_logger.toml";

/// Environment variable prefix, e.g. `SENSOR_LOGGER_STORAGE__CSV_ENABLED=false`.
pub const ENV_PREFIX: &str = "SENSOR_LOGGER_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Name, log level and log format.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Sensor endpoint settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Output directory, file prefix and sink switches.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Sensor endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint used when the operator does not enter one
    #[serde(default = "default_url")]
    pub default_url: String,
    /// Capacity of the transport event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory the CSV and XLSX files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Base name used when the operator does not enter one
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    /// Write the CSV append log.
    #[serde(default = "default_enabled")]
    pub csv_enabled: bool,
    /// Write the XLSX workbook.
    #[serde(default = "default_enabled")]
    pub xlsx_enabled: bool,
}

// Default value functions
fn default_name() -> String {
    "Sensor Logger".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_url() -> String {
    "ws://192.168.4.1/ws".to_string()
}

fn default_event_buffer() -> usize {
    256
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    crate::sink::DEFAULT_PREFIX.to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_url: default_url(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            default_prefix: default_prefix(),
            csv_enabled: default_enabled(),
            xlsx_enabled: default_enabled(),
        }
    }
}

impl LoggerConfig {
    /// Load configuration from config/sensor_logger.toml and environment variables
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(LoggerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        self.check().map_err(LoggerError::Configuration)
    }

    fn check(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        let url = self.connection.default_url.trim();
        if url.is_empty() {
            return Err("connection.default_url cannot be empty".to_string());
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(format!(
                "Invalid default_url '{}'. Must start with ws:// or wss://",
                url
            ));
        }

        if self.connection.event_buffer == 0 {
            return Err("connection.event_buffer must be greater than 0".to_string());
        }

        if self.storage.default_prefix.trim().is_empty() {
            return Err("storage.default_prefix cannot be empty".to_string());
        }

        if !self.storage.csv_enabled && !self.storage.xlsx_enabled {
            return Err("At least one of storage.csv_enabled and storage.xlsx_enabled must be true".to_string());
        }

        Ok(())
    }
}
