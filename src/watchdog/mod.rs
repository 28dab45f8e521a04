//! Watchdog Module
//!
//! Keeps a Windows service (or systemd unit) alive. The monitor probes for the
//! service's process and, when it is gone, asks the service manager to start
//! it again and waits for it to report running.

pub mod control;
pub mod error;
pub mod monitor;
pub mod probe;


pub use control::{
    wait_for_status, wait_for_status_with_interval, ServiceControl, ServiceStatus,
    SystemServiceControl, STATUS_POLL_INTERVAL_MS,
};
pub use error::{WatchdogError, WatchdogResult};
pub use monitor::{CheckOutcome, MonitorStats, ServiceMonitor};
pub use probe::{normalize_process_name, ProcessProbe, SystemProcessProbe};
