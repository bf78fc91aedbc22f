use std::path::PathBuf;
use std::time::Duration;

lazy_static! {
    pub static ref START_TIME: std::time::Instant = std::time::Instant::now();

    /// Root directory under which every application's install tree lives.
    pub static ref APPS_ROOT: PathBuf = PathBuf::from("/opt/apps");

    /// Fixed path of the single-record reboot-fault ledger (spec 4.2 / 6).
    pub static ref REBOOT_FAULT_RECORD_PATH: PathBuf = PathBuf::from("/opt/legato/appRebootFault");

    pub static ref SUPERVISOR_LOG_DIR: PathBuf = PathBuf::from("/var/log/supervisor");
}

/// Soft-kill grace period: time between SIGTERM and SIGKILL (spec 4.1/6).
pub const KILL_TIMEOUT: Duration = Duration::from_millis(300);

/// Reboot-class fault grace interval (spec 4.1.5 / 4.2 / 6).
pub const REBOOT_GRACE_INTERVAL: Duration = Duration::from_secs(120);

/// Restart/RestartApp fault-limit window (spec 4.1.5).
pub const FAULT_LIMIT_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum number of supplementary gids an application may be configured
/// with (spec 3 / 9 open question resolution: see SPEC_FULL.md).
pub const MAX_SUPPLEMENTARY_GIDS: usize = 8;

/// Upper bound on how long the two-phase termination freeze poll
/// (spec 4.1.2 / 5) may spin before giving up and logging a timeout.
pub const FREEZE_POLL_TIMEOUT: Duration = Duration::from_millis(50);
pub const FREEZE_POLL_INTERVAL: Duration = Duration::from_millis(2);
