//! Process Probe
//!
//! Answers "is a process with this name alive?". Names are given without an
//! executable extension, so `postgres` and `postgres.exe` are the same probe.

use super::error::WatchdogResult;

/// Liveness check for a named process
pub trait ProcessProbe: Send + Sync {
    /// Whether at least one process called `process_name` is running
    fn is_running(&self, process_name: &str) -> WatchdogResult<bool>;
}

/// Probe backed by the operating system's process table
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProbe;

impl SystemProcessProbe {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessProbe for SystemProcessProbe {
    fn is_running(&self, process_name: &str) -> WatchdogResult<bool> {
        let name = normalize_process_name(process_name);
        if name.is_empty() {
            return Ok(false);
        }
        find_process(name)
    }
}

/// Strip surrounding whitespace and a trailing `.exe`
pub fn normalize_process_name(name: &str) -> &str {
    let name = name.trim();
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

/// Linux truncates `/proc/<pid>/comm` to this many bytes
#[cfg(any(target_os = "linux", test))]
const COMM_MAX_LEN: usize = 15;

/// Match a `/proc` entry against `wanted`.
///
/// `comm` alone is enough for short names; longer names also need the
/// basename of `argv[0]` to match because `comm` is truncated.
#[cfg(any(target_os = "linux", test))]
fn matches_proc_entry(comm: &[u8], argv0: Option<&str>, wanted: &str) -> bool {
    let wanted_bytes = wanted.as_bytes();
    let prefix = &wanted_bytes[..wanted_bytes.len().min(COMM_MAX_LEN)];
    if comm != prefix {
        return false;
    }
    if wanted_bytes.len() <= COMM_MAX_LEN {
        return true;
    }

    argv0
        .and_then(|arg| std::path::Path::new(arg).file_name())
        .and_then(|base| base.to_str())
        .map(|base| base == wanted)
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
fn find_process(name: &str) -> WatchdogResult<bool> {
    use super::error::WatchdogError;

    let entries = std::fs::read_dir("/proc")
        .map_err(|e| WatchdogError::ProbeFailed(format!("cannot read /proc: {}", e)))?;

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let is_pid = file_name
            .to_str()
            .map(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false);
        if !is_pid {
            continue;
        }

        // Processes may exit while we scan
        let Ok(comm) = std::fs::read(entry.path().join("comm")) else {
            continue;
        };
        let comm = comm.strip_suffix(b"\n").unwrap_or(&comm);

        let cmdline = std::fs::read(entry.path().join("cmdline")).unwrap_or_default();
        let argv0 = cmdline
            .split(|b| *b == 0)
            .next()
            .and_then(|arg| std::str::from_utf8(arg).ok());

        if matches_proc_entry(comm, argv0, name) {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(windows)]
fn find_process(name: &str) -> WatchdogResult<bool> {
    use super::error::WatchdogError;
    use std::process::Command;

    let image = format!("{}.exe", name);
    let output = Command::new("tasklist")
        .args(["/FI", &format!("IMAGENAME eq {}", image), "/NH", "/FO", "CSV"])
        .output()?;

    if !output.status.success() {
        return Err(WatchdogError::ProbeFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let quoted = format!("\"{}\"", image.to_lowercase());
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| line.to_lowercase().starts_with(&quoted)))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn find_process(name: &str) -> WatchdogResult<bool> {
    use super::error::WatchdogError;
    use std::process::Command;

    let output = Command::new("pgrep").args(["-x", name]).output()?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(WatchdogError::ProbeFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
    }
}

#[cfg(not(any(unix, windows)))]
fn find_process(_name: &str) -> WatchdogResult<bool> {
    Err(super::error::WatchdogError::unsupported())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_process_name() {
        assert_eq!(normalize_process_name("postgres"), "postgres");
        assert_eq!(normalize_process_name("postgres.exe"), "postgres");
        assert_eq!(normalize_process_name("Spooler.EXE"), "Spooler");
        assert_eq!(normalize_process_name("  nginx \n"), "nginx");
        assert_eq!(normalize_process_name(".exe"), ".exe");
    }

    #[test]
    fn test_short_name_matches_comm() {
        assert!(matches_proc_entry(b"nginx", None, "nginx"));
        assert!(!matches_proc_entry(b"nginx", None, "nginx-proxy"));
        assert!(!matches_proc_entry(b"sshd", Some("/usr/sbin/sshd"), "nginx"));
    }

    #[test]
    fn test_long_name_needs_argv0() {
        let wanted = "very-long-service-daemon";
        let comm = &wanted.as_bytes()[..COMM_MAX_LEN];

        assert!(matches_proc_entry(comm, Some("/opt/bin/very-long-service-daemon"), wanted));
        assert!(!matches_proc_entry(comm, Some("/opt/bin/very-long-service-other"), wanted));
        assert!(!matches_proc_entry(comm, None, wanted));
    }

    #[test]
    fn test_empty_name_is_never_running() {
        let probe = SystemProcessProbe::new();
        assert!(!probe.is_running("").unwrap());
        assert!(!probe.is_running("   ").unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_finds_current_process() {
        let comm = std::fs::read_to_string("/proc/self/comm").unwrap();
        let probe = SystemProcessProbe::new();
        assert!(probe.is_running(comm.trim()).unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unknown_process_is_not_running() {
        let probe = SystemProcessProbe::new();
        assert!(!probe.is_running("no-such-process-7f3a9c").unwrap());
    }
}
