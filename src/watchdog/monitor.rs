//! Service Monitor
//!
//! Checks that the monitored process is alive and restarts its service when
//! it is not. The monitor knows nothing about scheduling; it is handed to the
//! schedule service as a plain action.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::control::{wait_for_status, ServiceControl, ServiceStatus, SystemServiceControl};
use super::error::WatchdogResult;
use super::probe::{ProcessProbe, SystemProcessProbe};
use crate::config::MonitorConfig;
use crate::scheduler::TaskAction;

/// Result of one liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Process found
    Alive,
    /// Process missing, service restarted and reported running
    Restarted,
    /// Process missing and the restart attempt failed
    RestartFailed,
}

/// Counters kept by the monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub checks: u64,
    pub restarts_attempted: u64,
    pub restarts_succeeded: u64,
}

/// Watches one process and restarts its service
pub struct ServiceMonitor {
    service_name: String,
    process_name: String,
    start_timeout: Duration,
    probe: Arc<dyn ProcessProbe>,
    control: Arc<dyn ServiceControl>,
    checks: AtomicU64,
    restarts_attempted: AtomicU64,
    restarts_succeeded: AtomicU64,
}

impl ServiceMonitor {
    /// Monitor backed by the operating system
    pub fn new(config: &MonitorConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(SystemProcessProbe::new()),
            Arc::new(SystemServiceControl::new()),
        )
    }

    /// Monitor with explicit probe and service control
    pub fn with_backends(
        config: &MonitorConfig,
        probe: Arc<dyn ProcessProbe>,
        control: Arc<dyn ServiceControl>,
    ) -> Self {
        Self {
            service_name: config.service_name.clone(),
            process_name: config.process_name().to_string(),
            start_timeout: config.start_timeout(),
            probe,
            control,
            checks: AtomicU64::new(0),
            restarts_attempted: AtomicU64::new(0),
            restarts_succeeded: AtomicU64::new(0),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Probe the process and restart the service if it is gone.
    ///
    /// Restart failures are logged and reported as
    /// [`CheckOutcome::RestartFailed`]; only probe failures are errors.
    pub fn check(&self) -> WatchdogResult<CheckOutcome> {
        self.checks.fetch_add(1, Ordering::SeqCst);

        if self.probe.is_running(&self.process_name)? {
            tracing::trace!(process = %self.process_name, "Process is alive");
            return Ok(CheckOutcome::Alive);
        }

        tracing::warn!(
            service = %self.service_name,
            "'{}' is stopped, try to restart it.",
            self.service_name
        );

        match self.restart() {
            Ok(()) => {
                tracing::info!(service = %self.service_name, "'{}' restart successfully.", self.service_name);
                Ok(CheckOutcome::Restarted)
            }
            Err(e) => {
                tracing::error!(
                    service = %self.service_name,
                    "Restart service '{}' failed: {}",
                    self.service_name,
                    e
                );
                Ok(CheckOutcome::RestartFailed)
            }
        }
    }

    /// Start the service and wait until it reports running
    pub fn restart(&self) -> WatchdogResult<()> {
        self.restarts_attempted.fetch_add(1, Ordering::SeqCst);

        self.control.start(&self.service_name)?;
        wait_for_status(
            self.control.as_ref(),
            &self.service_name,
            ServiceStatus::Running,
            self.start_timeout,
        )?;

        self.restarts_succeeded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Wrap the monitor as a scheduler action
    pub fn action(self: &Arc<Self>) -> TaskAction {
        let monitor = Arc::clone(self);
        Arc::new(move || -> anyhow::Result<()> {
            monitor.check()?;
            Ok(())
        })
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            checks: self.checks.load(Ordering::SeqCst),
            restarts_attempted: self.restarts_attempted.load(Ordering::SeqCst),
            restarts_succeeded: self.restarts_succeeded.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for ServiceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMonitor")
            .field("service_name", &self.service_name)
            .field("process_name", &self.process_name)
            .field("start_timeout", &self.start_timeout)
            .field("stats", &self.stats())
            .finish()
    }
}
