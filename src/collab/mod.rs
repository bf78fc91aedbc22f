//! Collaborator interfaces (spec 6): the sandbox, resource-limit, SMACK,
//! cgroup-freezer, user/group database, and launcher adapters. These are
//! interfaces only — the core's decision logic never lives here (spec 2,
//! component 7: "interfaces only, no policy").

pub mod fake;
pub mod system;

use std::path::{Path, PathBuf};

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::error::Result;

/// A process configuration leaf under `procs/<name>` (spec 6: "opaque to
/// this core, passed to the launcher" — except for the two fields the core
/// itself needs: the fault policy and the watchdog action).
#[derive(Debug, Clone)]
pub struct ProcSpec {
    pub name: String,
    pub exe: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub fault_policy: crate::fault::FaultPolicy,
    pub watchdog_action: Option<String>,
}

/// Launcher-reported per-process run state (spec 4.1 `proc_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherProcState {
    Stopped,
    Running,
    Paused,
}

/// The low-level per-process launcher (spec 6, out of scope as a
/// mechanism): forks, execs, and reports exit status.
pub trait Launcher {
    fn start(&mut self, proc: &ProcSpec, install_path: &Path) -> Result<Pid>;

    #[allow(clippy::too_many_arguments)]
    fn start_sandboxed(
        &mut self,
        proc: &ProcSpec,
        chroot_root: &Path,
        uid: u32,
        gid: u32,
        supplementary_gids: &[u32],
        sandbox_path: &Path,
    ) -> Result<Pid>;

    fn state(&self, pid: Pid) -> LauncherProcState;

    /// Direct signal to one pid (spec 4.1.4 `StopProc`), distinct from the
    /// freezer's group-wide `send_signal`.
    fn send_signal(&self, pid: Pid, sig: Signal) -> Result<()>;

    /// Non-blocking reap of any children that have exited since the last
    /// call (spec 2: "process-exit notifications delivered by the launcher
    /// after reaping"). Must never block the event loop (spec 5).
    fn reap(&mut self) -> Vec<(Pid, WaitStatus)>;
}

/// Filesystem chroot assembly/teardown (spec 6).
pub trait Sandbox {
    fn get_path(&self, app_name: &str) -> Result<PathBuf>;
    fn setup(&self, app_name: &str, uid: u32, gid: u32) -> Result<()>;
    fn remove(&self, app_name: &str) -> Result<()>;
}

/// Per-app resource caps (spec 6).
pub trait ResourceLimits {
    fn apply(&self, app_name: &str) -> Result<()>;
    fn clear(&self, app_name: &str) -> Result<()>;
}

/// SMACK label/rule bindings (spec 6, 4.1.1).
pub trait Smack {
    fn set_rule(&self, subject: &str, perms: &str, object: &str) -> Result<()>;
    fn revoke_subject(&self, label: &str) -> Result<()>;
}

/// Derives SMACK labels from an app name (spec 6: `app_smack`).
pub trait AppSmackLabels {
    fn label(&self, app_name: &str) -> String;
    fn access_label(&self, app_name: &str, perms: &str) -> String;
}

/// cgroup-freezer state (spec 6, Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezerState {
    Thawed,
    Frozen,
    Freezing,
    Fault,
}

/// Outcome of a group-wide signal send (spec 6: `send_signal -> count |
/// fault`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendSignalResult {
    Sent(usize),
    NoProcesses,
    Fault,
}

/// Process-group freeze/signal/emptiness-query subsystem (spec 6, Glossary
/// "Freezer").
pub trait Freezer {
    fn freeze(&self, app_name: &str) -> Result<()>;
    fn thaw(&self, app_name: &str) -> Result<()>;
    fn state(&self, app_name: &str) -> FreezerState;
    fn send_signal(&self, app_name: &str, sig: Signal) -> SendSignalResult;
    fn is_empty(&self, app_name: &str) -> bool;
    fn track(&self, app_name: &str, pid: Pid);
    fn untrack(&self, app_name: &str, pid: Pid);
}

/// User/group database (spec 6).
pub trait UserDb {
    fn app_to_user_name(&self, app_name: &str) -> String;
    fn ids_of(&self, name: &str) -> Option<(u32, u32)>;
    fn create_group(&self, name: &str) -> Result<u32>;
}
