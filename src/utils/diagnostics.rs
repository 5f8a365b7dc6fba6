//! Host facts and runtime counters for the startup log

use std::fmt;
use std::time::{Duration, Instant};

use sysinfo::System;
use tracing::info;

use crate::capture::CaptureStats;
use crate::desktop::DesktopSwitch;
use crate::input::InputStats;

const UNKNOWN: &str = "unknown";

/// Facts about the host, gathered once at startup
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// e.g. "Windows"
    pub os_name: String,
    #[allow(missing_docs)]
    pub os_version: String,
    /// Build number on Windows
    pub kernel_version: String,
    /// Logical processors
    pub cpu_count: usize,
    #[allow(missing_docs)]
    pub total_memory_mb: u64,
    #[allow(missing_docs)]
    pub hostname: String,
    /// Session the agent process runs in; 0 for services
    pub agent_session_id: Option<u32>,
}

impl SystemInfo {
    /// Query sysinfo and the process token
    pub fn gather() -> Self {
        let mut host = System::new();
        host.refresh_cpu();
        host.refresh_memory();

        let or_unknown = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_owned());

        Self {
            os_name: or_unknown(System::name()),
            os_version: or_unknown(System::os_version()),
            kernel_version: or_unknown(System::kernel_version()),
            cpu_count: host.cpus().len(),
            total_memory_mb: host.total_memory() >> 20,
            hostname: or_unknown(hostname::get().ok().and_then(|h| h.into_string().ok())),
            agent_session_id: current_session_id(),
        }
    }

    /// Whether the agent runs in the non-interactive services session
    pub fn in_service_session(&self) -> bool {
        self.agent_session_id == Some(0)
    }

    /// One structured info event
    pub fn log(&self) {
        info!(
            os = %format_args!("{} {}", self.os_name, self.os_version),
            build = %self.kernel_version,
            host = %self.hostname,
            cpus = self.cpu_count,
            memory_mb = self.total_memory_mb,
            session = ?self.agent_session_id,
            service = self.in_service_session(),
            "Host"
        );
    }
}

/// Session id of the current process
#[cfg(windows)]
pub fn current_session_id() -> Option<u32> {
    use windows::Win32::System::RemoteDesktop::ProcessIdToSessionId;
    use windows::Win32::System::Threading::GetCurrentProcessId;

    let mut session_id = 0u32;
    // SAFETY: `session_id` is a valid out-pointer.
    unsafe { ProcessIdToSessionId(GetCurrentProcessId(), &mut session_id) }
        .ok()
        .map(|()| session_id)
}

/// Session id of the current process
#[cfg(not(windows))]
pub fn current_session_id() -> Option<u32> {
    None
}

/// Counters folded from the capture service and the input injector
#[derive(Debug, Clone)]
pub struct RuntimeStats {
    started: Instant,
    /// Frames encoded and returned
    pub frames_captured: u64,
    /// Frames that never reached a viewer
    pub frames_dropped: u64,
    /// Backend rebuilds after topology changes
    pub reinitializations: u64,
    #[allow(missing_docs)]
    pub input_executed: u64,
    #[allow(missing_docs)]
    pub input_failed: u64,
    /// Dropped because input was disabled
    pub input_dropped: u64,
}

impl RuntimeStats {
    /// Zeroed counters, uptime starting now
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    fn started_at(started: Instant) -> Self {
        Self {
            started,
            frames_captured: 0,
            frames_dropped: 0,
            reinitializations: 0,
            input_executed: 0,
            input_failed: 0,
            input_dropped: 0,
        }
    }

    /// Refresh counters from the live services
    pub fn update(&mut self, capture: &CaptureStats, input: Option<&InputStats>) {
        self.frames_captured = capture.frames_captured();
        self.frames_dropped = capture.frames_dropped();
        self.reinitializations = capture.reinitializations();
        if let Some(input) = input {
            self.input_executed = input.executed();
            self.input_failed = input.failed();
            self.input_dropped = input.dropped();
        }
    }

    #[allow(missing_docs)]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Uptime as `1h 02m 03s`, hours omitted under an hour
    pub fn uptime_string(&self) -> String {
        Uptime(self.uptime()).to_string()
    }

    /// One structured info event
    pub fn log_status(&self) {
        info!(
            uptime = %Uptime(self.uptime()),
            frames = self.frames_captured,
            frames_dropped = self.frames_dropped,
            reinit = self.reinitializations,
            input = self.input_executed,
            input_failed = self.input_failed,
            input_dropped = self.input_dropped,
            "Agent status"
        );
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

struct Uptime(Duration);

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
        if h > 0 {
            write!(f, "{h}h {m:02}m {s:02}s")
        } else {
            write!(f, "{m}m {s:02}s")
        }
    }
}

/// Host facts plus the current input desktop
pub fn log_startup_diagnostics(switcher: &dyn DesktopSwitch) {
    let host = SystemInfo::gather();
    host.log();

    let desktop = switcher.current_desktop_name();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = if cfg!(debug_assertions) { "debug" } else { "release" },
        input_desktop = desktop.as_deref().unwrap_or("unavailable"),
        "Agent"
    );

    if host.in_service_session() {
        info!("Running in session 0; capture and input follow the input desktop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_fills_strings() {
        let info = SystemInfo::gather();
        assert!(!info.os_name.is_empty());
        assert!(!info.hostname.is_empty());
        #[cfg(not(windows))]
        assert!(!info.in_service_session());
    }

    #[test]
    fn test_update_copies_counters() {
        let mut stats = RuntimeStats::new();
        stats.frames_captured = 9;
        stats.update(&CaptureStats::default(), Some(&InputStats::default()));
        assert_eq!(stats.frames_captured, 0);
        assert_eq!(stats.input_executed, 0);
        assert!(stats.uptime() < Duration::from_secs(1));
    }

    #[test]
    fn test_uptime_format() {
        assert_eq!(Uptime(Duration::from_secs(3661)).to_string(), "1h 01m 01s");
        assert_eq!(Uptime(Duration::from_secs(59)).to_string(), "0m 59s");

        let stats = RuntimeStats::started_at(Instant::now() - Duration::from_secs(7325));
        assert_eq!(stats.uptime_string(), "2h 02m 05s");
    }
}
