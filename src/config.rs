//! Configuration types for Tapedeck

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rules::RuleSet;
use crate::{Result, TapedeckError};

/// Default storage key
pub const DEFAULT_STORAGE_KEY: &str = "_tapedeck";

/// Where persisted state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per key in a directory
    File,
    /// Process memory only
    Memory,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Site the engine records under
    pub site: String,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Autosave configuration
    #[serde(default)]
    pub autosave: AutosaveConfig,
    /// Size limits for persisted state
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Rules used when nothing has been persisted yet
    #[serde(default)]
    pub rules: RuleSet,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Directory for the file backend
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Key the state is stored under
    #[serde(default = "default_key")]
    pub key: String,
    /// Hard capacity of the memory backend in bytes
    #[serde(default)]
    pub capacity_bytes: Option<usize>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dir: None,
            key: default_key(),
            capacity_bytes: None,
        }
    }
}

/// Periodic save configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    /// Interval between saves in milliseconds, 0 disables autosave
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    30_000
}

impl AutosaveConfig {
    /// Autosave period, if enabled
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

/// Byte budget for persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Serialized size above which eviction starts
    pub high_water_bytes: usize,
    /// Eviction stops once the size drops below this
    pub low_water_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            high_water_bytes: 3_500_000,
            low_water_bytes: 3_000_000,
        }
    }
}

impl LimitsConfig {
    /// Validate the limits
    ///
    /// # Errors
    ///
    /// Returns error if either mark is zero or they are inverted
    pub fn validate(&self) -> Result<()> {
        if self.low_water_bytes == 0 || self.high_water_bytes == 0 {
            return Err(TapedeckError::ConfigError(
                "Size limits must be greater than zero".to_string(),
            ));
        }
        if self.low_water_bytes >= self.high_water_bytes {
            return Err(TapedeckError::ConfigError(format!(
                "low_water_bytes ({}) must be below high_water_bytes ({})",
                self.low_water_bytes, self.high_water_bytes
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Configuration for a site with every other setting at its default
    pub fn for_site(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            storage: StorageConfig::default(),
            autosave: AutosaveConfig::default(),
            limits: LimitsConfig::default(),
            rules: RuleSet::default(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapedeckError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TapedeckError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.site.is_empty() {
            return Err(TapedeckError::ConfigError(
                "site cannot be empty".to_string(),
            ));
        }

        if self.storage.key.is_empty() {
            return Err(TapedeckError::ConfigError(
                "storage.key cannot be empty".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::File {
            match &self.storage.dir {
                None => {
                    return Err(TapedeckError::ConfigError(
                        "storage.dir is required for the file backend".to_string(),
                    ));
                }
                Some(dir) if !dir.is_dir() => {
                    return Err(TapedeckError::ConfigError(format!(
                        "Storage directory does not exist: {}",
                        dir.display()
                    )));
                }
                Some(_) => {}
            }
        }

        self.limits.validate()?;
        self.rules.validate()?;

        Ok(())
    }
}
