//! Error types for the service monitor
//!
//! Each module owns its error enum; `MonitorError` wraps them for callers
//! that drive the whole process.

use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::scheduler::SchedulerError;
use crate::watchdog::WatchdogError;

/// Result type alias for service monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for the service monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Watchdog error: {0}")]
    Watchdog(#[from] WatchdogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Whether the process should keep going after this error.
    ///
    /// Only probe and service-manager failures are transient; everything
    /// else happens at startup and is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MonitorError::Watchdog(_))
    }
}
