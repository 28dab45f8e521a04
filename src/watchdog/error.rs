//! Error types for the watchdog module

use thiserror::Error;

/// Watchdog errors
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Failed to query processes: {0}")]
    ProbeFailed(String),

    #[error("Failed to start service '{service}': {reason}")]
    StartFailed { service: String, reason: String },

    #[error("Failed to query service '{service}': {reason}")]
    QueryFailed { service: String, reason: String },

    #[error("Service '{service}' did not reach {desired} within {timeout_ms}ms")]
    StartTimeout {
        service: String,
        desired: super::ServiceStatus,
        timeout_ms: u64,
    },

    #[error("Service control is not supported on {platform}")]
    Unsupported { platform: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for watchdog operations
pub type WatchdogResult<T> = Result<T, WatchdogError>;

impl WatchdogError {
    /// Error for platforms without a supported backend
    pub fn unsupported() -> Self {
        WatchdogError::Unsupported {
            platform: std::env::consts::OS.to_string(),
        }
    }
}
