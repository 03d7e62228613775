//! # Config - DocStore runtime settings
//!
//! All settings come from environment variables:
//!
//! ```text
//! DOCSTORE_DATA_DIR   directory holding the .wal segments   (default: "data")
//! DOCSTORE_WAL_SYNC   fsync after every WAL flush           (default: "true")
//! DOCSTORE_LOG        tracing filter when RUST_LOG is unset (default: "info")
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const ENV_DATA_DIR: &str = "DOCSTORE_DATA_DIR";
pub const ENV_WAL_SYNC: &str = "DOCSTORE_WAL_SYNC";
pub const ENV_LOG: &str = "DOCSTORE_LOG";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Storage directory; created on open if missing.
    pub data_dir: PathBuf,
    /// If `true`, every WAL flush is followed by `fsync`.
    pub wal_sync: bool,
    /// `tracing` filter directive used by the CLI.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wal_sync: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_wal_sync(mut self, wal_sync: bool) -> Self {
        self.wal_sync = wal_sync;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Unset keys fall
    /// back to the defaults; set-but-unparseable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_WAL_SYNC) {
            config.wal_sync = parse_bool(ENV_WAL_SYNC, &raw)?;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|f| !f.is_empty()) {
            config.log_filter = filter;
        }

        Ok(config)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}
