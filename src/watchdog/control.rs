//! Service Control
//!
//! Starts a managed service and reads back its status through the platform
//! service manager (`sc` on Windows, `systemctl` elsewhere).

use std::fmt;
#[cfg(any(unix, windows))]
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::error::{WatchdogError, WatchdogResult};

/// Interval between status polls while waiting for a service
pub const STATUS_POLL_INTERVAL_MS: u64 = 250;

/// Coarse service status, common to all service managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    StartPending,
    Running,
    StopPending,
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::StartPending => write!(f, "start pending"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::StopPending => write!(f, "stop pending"),
            ServiceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Operations the monitor needs from a service manager
pub trait ServiceControl: Send + Sync {
    /// Ask the service manager to start `service`. Returns once the request
    /// is accepted, not once the service runs.
    fn start(&self, service: &str) -> WatchdogResult<()>;

    /// Current status of `service`
    fn status(&self, service: &str) -> WatchdogResult<ServiceStatus>;
}

/// Poll `control` until `service` reports `desired` or `timeout` elapses
pub fn wait_for_status(
    control: &dyn ServiceControl,
    service: &str,
    desired: ServiceStatus,
    timeout: Duration,
) -> WatchdogResult<()> {
    wait_for_status_with_interval(
        control,
        service,
        desired,
        timeout,
        Duration::from_millis(STATUS_POLL_INTERVAL_MS),
    )
}

/// [`wait_for_status`] with an explicit poll interval
pub fn wait_for_status_with_interval(
    control: &dyn ServiceControl,
    service: &str,
    desired: ServiceStatus,
    timeout: Duration,
    poll_interval: Duration,
) -> WatchdogResult<()> {
    let started = Instant::now();

    loop {
        let status = control.status(service)?;
        if status == desired {
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(WatchdogError::StartTimeout {
                service: service.to_string(),
                desired,
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        tracing::trace!(service, %status, "Waiting for service status {}", desired);
        std::thread::sleep(poll_interval.min(timeout - elapsed));
    }
}

/// Service control backed by the platform service manager
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemServiceControl;

impl SystemServiceControl {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl ServiceControl for SystemServiceControl {
    fn start(&self, service: &str) -> WatchdogResult<()> {
        let output = Command::new("sc").args(["start", service]).output()?;
        check_output(service, &output, |reason| WatchdogError::StartFailed {
            service: service.to_string(),
            reason,
        })
    }

    fn status(&self, service: &str) -> WatchdogResult<ServiceStatus> {
        let output = Command::new("sc").args(["query", service]).output()?;
        check_output(service, &output, |reason| WatchdogError::QueryFailed {
            service: service.to_string(),
            reason,
        })?;
        Ok(parse_sc_state(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(unix)]
impl ServiceControl for SystemServiceControl {
    fn start(&self, service: &str) -> WatchdogResult<()> {
        let output = Command::new("systemctl").args(["start", service]).output()?;
        check_output(service, &output, |reason| WatchdogError::StartFailed {
            service: service.to_string(),
            reason,
        })
    }

    fn status(&self, service: &str) -> WatchdogResult<ServiceStatus> {
        // `is-active` exits non-zero for anything but "active", so only the
        // printed state is meaningful
        let output = Command::new("systemctl").args(["is-active", service]).output()?;
        Ok(parse_systemd_state(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(not(any(unix, windows)))]
impl ServiceControl for SystemServiceControl {
    fn start(&self, _service: &str) -> WatchdogResult<()> {
        Err(WatchdogError::unsupported())
    }

    fn status(&self, _service: &str) -> WatchdogResult<ServiceStatus> {
        Err(WatchdogError::unsupported())
    }
}

#[cfg(any(unix, windows))]
fn check_output(
    service: &str,
    output: &Output,
    to_error: impl FnOnce(String) -> WatchdogError,
) -> WatchdogResult<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reason = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    tracing::debug!(service, code = ?output.status.code(), "Service command failed");
    Err(to_error(reason))
}

/// Map `systemctl is-active` output to a status
pub fn parse_systemd_state(output: &str) -> ServiceStatus {
    match output.trim() {
        "active" | "reloading" => ServiceStatus::Running,
        "activating" => ServiceStatus::StartPending,
        "deactivating" => ServiceStatus::StopPending,
        "inactive" | "failed" | "dead" => ServiceStatus::Stopped,
        _ => ServiceStatus::Unknown,
    }
}

/// Map the `STATE` line of `sc query` output to a status
pub fn parse_sc_state(output: &str) -> ServiceStatus {
    let Some(state) = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("STATE"))
    else {
        return ServiceStatus::Unknown;
    };

    if state.contains("START_PENDING") {
        ServiceStatus::StartPending
    } else if state.contains("STOP_PENDING") {
        ServiceStatus::StopPending
    } else if state.contains("RUNNING") {
        ServiceStatus::Running
    } else if state.contains("STOPPED") {
        ServiceStatus::Stopped
    } else {
        ServiceStatus::Unknown
    }
}
