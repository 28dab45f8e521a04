//! Tests for the logging system

use super::*;

#[test]
fn test_log_level_display() {
    assert_eq!(LogLevel::Trace.to_string(), "trace");
    assert_eq!(LogLevel::Debug.to_string(), "debug");
    assert_eq!(LogLevel::Info.to_string(), "info");
    assert_eq!(LogLevel::Warn.to_string(), "warn");
    assert_eq!(LogLevel::Error.to_string(), "error");
}

#[test]
fn test_log_level_to_tracing_level() {
    assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
}

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, LogLevel::Info);
    assert_eq!(config.format, LogFormat::Text);
    assert_eq!(config.output, LogOutput::Both);
    assert_eq!(config.rotation, RotationStrategy::Daily);
    assert_eq!(config.max_files, 7);
    assert!(config.include_target);
    assert!(!config.include_thread_id);
    assert!(!config.include_file_info);
    assert_eq!(config.log_directory, Some(default_log_directory()));
}

#[test]
fn test_logging_config_builder() {
    let config = LoggingConfig::new()
        .with_level(LogLevel::Debug)
        .with_format(LogFormat::Json)
        .with_output(LogOutput::File)
        .with_target(false)
        .with_thread_id(true)
        .with_file_info(true)
        .with_rotation(RotationStrategy::Hourly, 24)
        .with_module_level("service_monitor::scheduler", LogLevel::Trace);

    assert_eq!(config.level, LogLevel::Debug);
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.output, LogOutput::File);
    assert!(!config.include_target);
    assert!(config.include_thread_id);
    assert!(config.include_file_info);
    assert_eq!(config.rotation, RotationStrategy::Hourly);
    assert_eq!(config.max_files, 24);
    assert_eq!(
        config.module_levels.get("service_monitor::scheduler"),
        Some(&LogLevel::Trace)
    );
}

#[test]
fn test_logging_config_development() {
    let config = LoggingConfig::development();
    assert_eq!(config.level, LogLevel::Debug);
    assert_eq!(config.output, LogOutput::Console);
    assert!(config.include_file_info);
    assert!(!config.writes_files());
}

#[test]
fn test_logging_config_production() {
    let config = LoggingConfig::production();
    assert_eq!(config.level, LogLevel::Info);
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.output, LogOutput::Both);
    assert_eq!(config.max_files, 14);
    assert!(config.writes_files());
}

#[test]
fn test_logging_config_partial_json_uses_defaults() {
    let config: LoggingConfig = serde_json::from_str(r#"{"level": "warn", "output": "console"}"#).unwrap();
    assert_eq!(config.level, LogLevel::Warn);
    assert_eq!(config.output, LogOutput::Console);
    assert_eq!(config.format, LogFormat::Text);
    assert!(config.include_target);
    assert_eq!(config.max_files, 7);
}

#[test]
fn test_env_filter_includes_module_levels() {
    let config = LoggingConfig::new()
        .with_level(LogLevel::Warn)
        .with_module_level("service_monitor::watchdog", LogLevel::Debug);

    let filter = LoggingSystem::build_env_filter(&config).to_string();
    assert!(filter.contains("warn"));
    assert!(filter.contains("service_monitor::watchdog=debug"));
}

#[test]
fn test_init_reports_configured_settings() {
    let config = LoggingConfig::development().with_level(LogLevel::Warn);

    let system = LoggingSystem::init(config).unwrap();
    assert_eq!(system.log_level(), LogLevel::Warn);
    assert_eq!(system.log_directory(), None);

    // Only one pipeline can be installed per process
    assert!(matches!(
        LoggingSystem::init(LoggingConfig::development()),
        Err(LoggingError::InitializationError(_))
    ));
}
