//! Logging System
//!
//! Structured logs through `tracing`, written to the console, to a rolling
//! file, or both. Verbosity is set globally and per module.

mod config;

#[cfg(test)]
mod tests;

pub use config::{default_log_directory, LogFormat, LogLevel, LogOutput, LoggingConfig, RotationStrategy};

use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Base name of the log file; the appender adds a date suffix
pub const LOG_FILE_NAME: &str = "service-monitor.log";

/// Logging system errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Installed logging pipeline. Keep it alive for the life of the process,
/// dropping it flushes and stops the file writer.
pub struct LoggingSystem {
    config: LoggingConfig,
    _guards: Vec<WorkerGuard>,
}

impl LoggingSystem {
    /// Initialize the logging system with the given configuration
    pub fn init(config: LoggingConfig) -> LoggingResult<Self> {
        if config.writes_files() {
            if let Some(ref log_dir) = config.log_directory {
                std::fs::create_dir_all(log_dir).map_err(|e| {
                    LoggingError::DirectoryCreationError(format!(
                        "Failed to create log directory {:?}: {}",
                        log_dir, e
                    ))
                })?;
            }
        }

        let mut guards = Vec::new();
        let env_filter = Self::build_env_filter(&config);
        let registry = tracing_subscriber::registry();

        match config.output {
            LogOutput::Console => {
                registry
                    .with(env_filter)
                    .with(Self::create_console_layer(&config))
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
            LogOutput::File => {
                let (file_layer, guard) = Self::create_file_layer(&config)?;
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
            LogOutput::Both => {
                let console_layer = Self::create_console_layer(&config);
                let (file_layer, guard) = Self::create_file_layer(&config)?;
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
        }

        Ok(Self {
            config,
            _guards: guards,
        })
    }

    /// Build environment filter from configuration
    pub(crate) fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
        let mut filter = EnvFilter::new(config.level.to_string());

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring log level for module '{}': {}", module, e),
            }
        }

        filter
    }

    fn create_console_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_target(config.include_target)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info);

        if config.format == LogFormat::Json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }

    /// Create file logging layer with rotation
    fn create_file_layer<S>(
        config: &LoggingConfig,
    ) -> LoggingResult<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard)>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let log_dir = config
            .log_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("logs"));

        let rotation = match config.rotation {
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Never => Rotation::NEVER,
        };

        let mut builder = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(LOG_FILE_NAME);
        if config.max_files > 0 {
            builder = builder.max_log_files(config.max_files);
        }
        let file_appender = builder
            .build(&log_dir)
            .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(config.include_target)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .with_ansi(false);

        if config.format == LogFormat::Json {
            Ok((layer.json().boxed(), guard))
        } else {
            Ok((layer.boxed(), guard))
        }
    }

    /// Get current log directory
    pub fn log_directory(&self) -> Option<&PathBuf> {
        self.config.log_directory.as_ref()
    }

    pub fn log_level(&self) -> LogLevel {
        self.config.level
    }
}

/// Plain console logging at `level`, used when the configured pipeline
/// cannot be installed. Does nothing if a subscriber is already set.
pub fn init_basic_logging(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level.to_tracing_level())
        .try_init();
}
