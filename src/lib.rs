//! Service Monitor - keeps a service running
//!
//! This crate provides:
//! - A recurring-task scheduler whose tasks never overlap themselves
//! - Process probes and service control for Windows and Unix
//! - The service monitor that ties them together
//! - JSON configuration and structured logging

pub mod config;
pub mod core;
pub mod logging;
pub mod scheduler;
pub mod watchdog;

// Re-export commonly used items
pub use crate::core::error::{MonitorError, Result};
pub use config::{ConfigStore, ConfigStoreConfig, MonitorConfig};
pub use logging::{LoggingConfig, LoggingSystem};
pub use scheduler::{ScheduleService, TaskAction, TaskId};
pub use watchdog::{CheckOutcome, ServiceMonitor};

/// Name of the recurring liveness check
pub const MONITOR_TASK_NAME: &str = "MonitorServiceAlive";
