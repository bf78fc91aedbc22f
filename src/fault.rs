//! Pure fault-policy functions (spec 4.3): wait-status -> `ProcFaultAction`,
//! watchdog-action string -> `WatchdogAction`, and the fault-limit window
//! arithmetic of spec 4.1.5.

use std::time::Duration;

use nix::sys::wait::WaitStatus;

use crate::consts::{FAULT_LIMIT_INTERVAL, REBOOT_GRACE_INTERVAL};

/// What the `Application` should do in response to a process exit (spec 3/4.1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProcFaultAction {
    NoFault,
    Ignore,
    Restart,
    RestartApp,
    StopApp,
    Reboot,
}

/// What the `Application` should do in response to a watchdog expiry (spec 4.1.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WatchdogAction {
    Ignore,
    Stop,
    Restart,
    RestartApp,
    StopApp,
    Reboot,
    Error,
    NotFound,
}

/// Per-process fault policy: what to do for a faulty exit and what counts as
/// "faulty" at all, configured under `procs/<name>` (spec 6, opaque to the
/// core beyond this single field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicy {
    pub on_fault: ProcFaultAction,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        FaultPolicy {
            on_fault: ProcFaultAction::Restart,
        }
    }
}

impl FaultPolicy {
    /// Classifies a reaped wait-status (spec 4.3: "must classify normal
    /// exits as NoFault, configured-policy faults as their configured
    /// action, and unknown faults as the configured default").
    pub fn classify(&self, status: &WaitStatus) -> ProcFaultAction {
        match status {
            WaitStatus::Exited(_, 0) => ProcFaultAction::NoFault,
            WaitStatus::Exited(_, _) => self.on_fault,
            WaitStatus::Signaled(_, _, _) => self.on_fault,
            _ => self.on_fault,
        }
    }
}

/// Maps a process's `onFault` config string to a `ProcFaultAction`; an
/// absent or unrecognized value defaults to `Restart` (`FaultPolicy::default`).
pub fn parse_fault_action(s: &str) -> ProcFaultAction {
    match s {
        "ignore" => ProcFaultAction::Ignore,
        "restart" => ProcFaultAction::Restart,
        "restartApp" => ProcFaultAction::RestartApp,
        "stopApp" => ProcFaultAction::StopApp,
        "reboot" => ProcFaultAction::Reboot,
        _ => ProcFaultAction::Restart,
    }
}

/// Maps the `watchdogAction` config string (spec 6) to a `WatchdogAction`.
pub fn parse_watchdog_action(s: &str) -> WatchdogAction {
    match s {
        "ignore" => WatchdogAction::Ignore,
        "stop" => WatchdogAction::Stop,
        "restart" => WatchdogAction::Restart,
        "restartApp" => WatchdogAction::RestartApp,
        "stopApp" => WatchdogAction::StopApp,
        "reboot" => WatchdogAction::Reboot,
        _ => WatchdogAction::Error,
    }
}

/// Fault-limit accounting (spec 4.1.5). `prev_fault_time` and `now` are
/// monotonic instants recorded on the `ProcessObject`; `now == None` means
/// this process has never faulted before.
pub fn restart_limit_reached(prev_fault_time: Option<Duration>, now: Duration) -> bool {
    match prev_fault_time {
        Some(prev) if now >= prev => now - prev <= FAULT_LIMIT_INTERVAL,
        _ => false,
    }
}

/// Reboot-class fault-limit accounting (spec 4.1.5): reached iff the ledger
/// already names this exact (app, proc) pair, i.e. within `REBOOT_GRACE_INTERVAL`.
pub fn reboot_limit_reached(ledger_matches: bool) -> bool {
    ledger_matches
}

pub const fn reboot_grace_interval() -> Duration {
    REBOOT_GRACE_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_exit_is_no_fault() {
        let policy = FaultPolicy {
            on_fault: ProcFaultAction::Restart,
        };
        assert_eq!(
            policy.classify(&WaitStatus::Exited(nix::unistd::Pid::from_raw(1), 0)),
            ProcFaultAction::NoFault
        );
    }

    #[test]
    fn nonzero_exit_uses_configured_action() {
        let policy = FaultPolicy {
            on_fault: ProcFaultAction::Reboot,
        };
        assert_eq!(
            policy.classify(&WaitStatus::Exited(nix::unistd::Pid::from_raw(1), 1)),
            ProcFaultAction::Reboot
        );
    }

    #[test]
    fn restart_limit_within_window() {
        assert!(restart_limit_reached(
            Some(Duration::from_secs(0)),
            Duration::from_secs(5)
        ));
        assert!(!restart_limit_reached(
            Some(Duration::from_secs(0)),
            Duration::from_secs(11)
        ));
        assert!(!restart_limit_reached(None, Duration::from_secs(5)));
    }

    #[test]
    fn watchdog_action_parsing() {
        assert_eq!(parse_watchdog_action("restart"), WatchdogAction::Restart);
        assert_eq!(parse_watchdog_action("bogus"), WatchdogAction::Error);
    }
}
