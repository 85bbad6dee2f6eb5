//! Configuration module for quotastore.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::PrivilegeScope;
use crate::{Result, StorageError};

/// Environment variable that overrides `storage.root`.
pub const ROOT_ENV_VAR: &str = "QUOTASTORE_ROOT";

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage root directory.
    #[serde(default = "default_root")]
    pub root: String,
    /// Timezone for rendering modification times (e.g., "Europe/Belgrade", "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// How folder-scoped privileges are looked up.
    #[serde(default)]
    pub privilege_scope: PrivilegeScope,
}

fn default_root() -> String {
    "data/storage".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            timezone: default_timezone(),
            privilege_scope: PrivilegeScope::default(),
        }
    }
}

impl StorageConfig {
    /// Root directory as a path.
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Keep the operation trail of earlier runs instead of truncating it.
    #[serde(default = "default_log_append")]
    pub append: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/quotastore.log".to_string()
}

fn default_log_append() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            append: default_log_append(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(StorageError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StorageError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `QUOTASTORE_ROOT`: Override the storage root directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(ROOT_ENV_VAR) {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the storage root is empty or the timezone is unknown.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(StorageError::Config("storage.root must not be empty".to_string()));
        }
        if self.storage.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(StorageError::Config(format!(
                "unknown timezone: {}",
                self.storage.timezone
            )));
        }
        Ok(())
    }
}
