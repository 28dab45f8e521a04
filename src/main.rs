//! Service Monitor
//!
//! Checks every interval that the configured service's process is alive and
//! restarts the service when it is not. Runs until Ctrl+C.
//!
//! Usage:
//!   service-monitor --service <NAME> [--process <NAME>] [--interval <MS>]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Handle;

use service_monitor::config::{default_config_path, ConfigError};
use service_monitor::logging::{init_basic_logging, LogLevel, LoggingSystem};
use service_monitor::{
    ConfigStore, ConfigStoreConfig, MonitorConfig, MonitorError, Result, ScheduleService,
    ServiceMonitor, MONITOR_TASK_NAME,
};

/// Keep a service running by restarting it whenever its process disappears
#[derive(Parser, Debug)]
#[command(name = "service-monitor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/service-monitor/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Service to keep running
    #[arg(short, long, value_name = "NAME")]
    service: Option<String>,

    /// Process that proves the service is alive (default: the service name)
    #[arg(short, long, value_name = "NAME")]
    process: Option<String>,

    /// Milliseconds to wait for a restarted service to report running
    #[arg(long, value_name = "MS")]
    start_timeout: Option<u64>,

    /// Milliseconds between checks
    #[arg(short, long, value_name = "MS")]
    interval: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the configuration file (with any values given here) and exit
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// Command line values win over the file
    fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(ref service) = self.service {
            config.service_name = service.clone();
        }
        if let Some(ref process) = self.process {
            config.process_name = Some(process.clone());
        }
        if let Some(start_timeout) = self.start_timeout {
            config.start_timeout_ms = start_timeout;
        }
        if let Some(interval) = self.interval {
            config.check_interval_ms = interval;
        }
        if self.verbose {
            config.logging.level = LogLevel::Debug;
        }
    }
}

async fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let settings = ConfigStoreConfig {
        config_path: cli.config_path(),
        create_default: false,
    };

    let mut config = match ConfigStore::new(settings).await {
        Ok(store) => store.get().await,
        // Without --config the command line alone may describe the service
        Err(ConfigError::NotFound(_)) if cli.config.is_none() => MonitorConfig::default(),
        Err(e) => return Err(e.into()),
    };

    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

async fn write_config(cli: &Cli) -> Result<PathBuf> {
    let store = ConfigStore::new(ConfigStoreConfig {
        config_path: cli.config_path(),
        create_default: true,
    })
    .await?;
    store.update(|config| cli.apply_overrides(config)).await?;
    Ok(store.config_path().to_path_buf())
}

async fn run(config: MonitorConfig) -> Result<()> {
    let scheduler = ScheduleService::new(Handle::current());
    let monitor = Arc::new(ServiceMonitor::new(&config));

    let task_id = scheduler.schedule_action(
        MONITOR_TASK_NAME,
        monitor.action(),
        config.initial_delay(),
        config.check_interval(),
    );
    if !task_id.is_valid() {
        return Err(MonitorError::Internal(format!(
            "could not schedule {}",
            MONITOR_TASK_NAME
        )));
    }

    tracing::info!(
        service = %config.service_name,
        process = monitor.process_name(),
        interval_ms = config.check_interval_ms,
        "Service monitor started, monitoring service '{}'",
        config.service_name
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    scheduler.cancel(task_id);

    let stats = monitor.stats();
    tracing::info!(
        checks = stats.checks,
        restarts_attempted = stats.restarts_attempted,
        restarts_succeeded = stats.restarts_succeeded,
        "Service monitor stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.init_config {
        match write_config(&cli).await {
            Ok(path) => {
                println!("Configuration written to {}", path.display());
                return;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    // Kept alive until exit so the file writer flushes
    let logging_system = match LoggingSystem::init(config.logging.clone()) {
        Ok(system) => {
            tracing::debug!(
                level = %system.log_level(),
                directory = ?system.log_directory(),
                "Logging system initialized"
            );
            Some(system)
        }
        Err(e) => {
            eprintln!("Failed to initialize logging system: {}. Using basic logging.", e);
            init_basic_logging(config.logging.level);
            None
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("Service monitor failed: {}", e);
        drop(logging_system);
        std::process::exit(1);
    }
}
