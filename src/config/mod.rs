//! Configuration Management Module
//!
//! The monitor reads one JSON file at startup:
//! - which service to keep alive and which process proves it is running
//! - check timing and restart timeout
//! - logging settings

mod storage;

pub use storage::{
    default_config_path, ConfigError, ConfigResult, ConfigStore, ConfigStoreConfig, MonitorConfig,
};
