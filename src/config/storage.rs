//! Configuration Storage Implementation
//!
//! JSON file-based configuration with:
//! - Atomic writes using temp file + rename
//! - Thread-safe access via RwLock
//! - Default template generation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::logging::LoggingConfig;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration store settings
#[derive(Debug, Clone)]
pub struct ConfigStoreConfig {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Write a default template when the file does not exist
    pub create_default: bool,
}

impl Default for ConfigStoreConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            create_default: false,
        }
    }
}

/// `<config dir>/service-monitor/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("service-monitor")
        .join("config.json")
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Name of the service to keep running
    pub service_name: String,

    /// Process to look for; the service name when absent
    #[serde(default)]
    pub process_name: Option<String>,

    /// How long a restart may take before it counts as failed
    #[serde(default = "default_start_timeout")]
    pub start_timeout_ms: u64,

    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,

    /// Delay before the first check
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> u32 {
    1
}

fn default_start_timeout() -> u64 {
    30_000
}

fn default_check_interval() -> u64 {
    1_000
}

fn default_initial_delay() -> u64 {
    1_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            service_name: String::new(),
            process_name: None,
            start_timeout_ms: default_start_timeout(),
            check_interval_ms: default_check_interval(),
            initial_delay_ms: default_initial_delay(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Default configuration for `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Effective process name
    pub fn process_name(&self) -> &str {
        match self.process_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.service_name,
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty".to_string()));
        }
        if self.check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "check_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration store with thread-safe access
pub struct ConfigStore {
    config: Arc<RwLock<MonitorConfig>>,
    settings: ConfigStoreConfig,
}

impl ConfigStore {
    /// Open the store, loading the file or writing a default template
    pub async fn new(settings: ConfigStoreConfig) -> ConfigResult<Self> {
        let config = if tokio::fs::try_exists(&settings.config_path).await? {
            Self::load_from_file(&settings.config_path).await?
        } else if settings.create_default {
            if let Some(parent) = settings.config_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let default_config = MonitorConfig::default();
            Self::save_to_file(&settings.config_path, &default_config).await?;
            tracing::info!(path = ?settings.config_path, "Wrote default configuration");
            default_config
        } else {
            return Err(ConfigError::NotFound(settings.config_path.clone()));
        };

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            settings,
        })
    }

    /// Load configuration from file
    pub async fn load_from_file(path: &Path) -> ConfigResult<MonitorConfig> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: MonitorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file with atomic write
    pub async fn save_to_file(path: &Path, config: &MonitorConfig) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(config)?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    /// Get current configuration (read-only)
    pub async fn get(&self) -> MonitorConfig {
        self.config.read().await.clone()
    }

    /// Update configuration and persist it
    pub async fn update<F>(&self, updater: F) -> ConfigResult<MonitorConfig>
    where
        F: FnOnce(&mut MonitorConfig),
    {
        let mut config = self.config.write().await;
        updater(&mut config);
        Self::save_to_file(&self.settings.config_path, &config).await?;
        Ok(config.clone())
    }

    /// Replace the whole configuration
    pub async fn set(&self, new_config: MonitorConfig) -> ConfigResult<()> {
        let mut config = self.config.write().await;
        Self::save_to_file(&self.settings.config_path, &new_config).await?;
        *config = new_config;
        Ok(())
    }

    /// Re-read the file, replacing the in-memory copy
    pub async fn reload(&self) -> ConfigResult<MonitorConfig> {
        let loaded = Self::load_from_file(&self.settings.config_path).await?;
        *self.config.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Get configuration file path
    pub fn config_path(&self) -> &Path {
        &self.settings.config_path
    }
}
