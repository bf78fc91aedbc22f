//! In-memory collaborator test doubles. Shared by unit tests inside the
//! library and by the integration tests under `tests/` (spec 8 end-to-end
//! scenarios never touch the real filesystem, SMACK, or cgroups).

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use super::{
    AppSmackLabels, Freezer, FreezerState, Launcher, LauncherProcState, ProcSpec, ResourceLimits,
    SendSignalResult, Sandbox, Smack, UserDb,
};
use crate::error::{Result, SupervisorError};

/// Records a single fake process: its state and the exit status queued up
/// for the next `reap()`, if any.
struct FakeProc {
    state: LauncherProcState,
    pending_exit: Option<WaitStatus>,
}

/// A `Launcher` that never forks: `start`/`start_sandboxed` hand out
/// sequential fake pids, and tests drive exits explicitly via
/// [`FakeLauncher::finish`] rather than waiting on a real child.
#[derive(Default)]
pub struct FakeLauncher {
    next_pid: i32,
    procs: HashMap<i32, FakeProc>,
    pub launched: Vec<ProcSpec>,
    pub fail_next: bool,
}

impl FakeLauncher {
    pub fn new() -> Self {
        FakeLauncher {
            next_pid: 1,
            procs: HashMap::new(),
            launched: Vec::new(),
            fail_next: false,
        }
    }

    fn do_start(&mut self, proc: &ProcSpec) -> Result<Pid> {
        if self.fail_next {
            self.fail_next = false;
            return Err(SupervisorError::LaunchFailure {
                app: String::new(),
                proc: proc.name.clone(),
                reason: "injected failure".to_string(),
            });
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        self.procs.insert(
            pid,
            FakeProc {
                state: LauncherProcState::Running,
                pending_exit: None,
            },
        );
        self.launched.push(proc.clone());
        Ok(Pid::from_raw(pid))
    }

    /// Test hook: queue `status` as this pid's next `reap()` result.
    pub fn finish(&mut self, pid: Pid, status: WaitStatus) {
        if let Some(p) = self.procs.get_mut(&pid.as_raw()) {
            p.state = LauncherProcState::Stopped;
            p.pending_exit = Some(status);
        }
    }

    pub fn is_running(&self, pid: Pid) -> bool {
        self.procs
            .get(&pid.as_raw())
            .map(|p| p.state == LauncherProcState::Running)
            .unwrap_or(false)
    }
}

impl Launcher for FakeLauncher {
    fn start(&mut self, proc: &ProcSpec, _install_path: &Path) -> Result<Pid> {
        self.do_start(proc)
    }

    fn start_sandboxed(
        &mut self,
        proc: &ProcSpec,
        _chroot_root: &Path,
        _uid: u32,
        _gid: u32,
        _supplementary_gids: &[u32],
        _sandbox_path: &Path,
    ) -> Result<Pid> {
        self.do_start(proc)
    }

    fn state(&self, pid: Pid) -> LauncherProcState {
        self.procs
            .get(&pid.as_raw())
            .map(|p| p.state)
            .unwrap_or(LauncherProcState::Stopped)
    }

    fn send_signal(&self, pid: Pid, _sig: Signal) -> Result<()> {
        if self.procs.contains_key(&pid.as_raw()) {
            Ok(())
        } else {
            Err(SupervisorError::NotFound(format!("pid {}", pid.as_raw())))
        }
    }

    fn reap(&mut self) -> Vec<(Pid, WaitStatus)> {
        let mut reaped = Vec::new();
        for (pid, p) in self.procs.iter_mut() {
            if let Some(status) = p.pending_exit.take() {
                reaped.push((Pid::from_raw(*pid), status));
            }
        }
        reaped
    }
}

/// A `FakeLauncher` behind an `Rc<RefCell<_>>`, so a caller that hands one
/// end to `Supervisor::new` (as a `Box<dyn Launcher>`) can keep the other end
/// to drive `finish()` from outside — `Supervisor` otherwise owns its
/// launcher opaquely and gives no way back in to a concrete `FakeLauncher`.
#[derive(Clone, Default)]
pub struct SharedFakeLauncher(pub Rc<RefCell<FakeLauncher>>);

impl SharedFakeLauncher {
    pub fn new() -> Self {
        SharedFakeLauncher(Rc::new(RefCell::new(FakeLauncher::new())))
    }

    pub fn finish(&self, pid: Pid, status: WaitStatus) {
        self.0.borrow_mut().finish(pid, status);
    }

    pub fn is_running(&self, pid: Pid) -> bool {
        self.0.borrow().is_running(pid)
    }
}

impl Launcher for SharedFakeLauncher {
    fn start(&mut self, proc: &ProcSpec, install_path: &Path) -> Result<Pid> {
        self.0.borrow_mut().start(proc, install_path)
    }

    fn start_sandboxed(
        &mut self,
        proc: &ProcSpec,
        chroot_root: &Path,
        uid: u32,
        gid: u32,
        supplementary_gids: &[u32],
        sandbox_path: &Path,
    ) -> Result<Pid> {
        self.0
            .borrow_mut()
            .start_sandboxed(proc, chroot_root, uid, gid, supplementary_gids, sandbox_path)
    }

    fn state(&self, pid: Pid) -> LauncherProcState {
        self.0.borrow().state(pid)
    }

    fn send_signal(&self, pid: Pid, sig: Signal) -> Result<()> {
        self.0.borrow().send_signal(pid, sig)
    }

    fn reap(&mut self) -> Vec<(Pid, WaitStatus)> {
        self.0.borrow_mut().reap()
    }
}

/// Tracks the app names that have had a sandbox set up/removed, without
/// touching the filesystem.
#[derive(Default)]
pub struct FakeSandbox {
    root: PathBuf,
    pub set_up: RefCell<Vec<String>>,
    pub removed: RefCell<Vec<String>>,
}

impl FakeSandbox {
    pub fn new(root: PathBuf) -> Self {
        FakeSandbox {
            root,
            set_up: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
        }
    }
}

impl Sandbox for FakeSandbox {
    fn get_path(&self, app_name: &str) -> Result<PathBuf> {
        Ok(self.root.join(app_name))
    }

    fn setup(&self, app_name: &str, _uid: u32, _gid: u32) -> Result<()> {
        self.set_up.borrow_mut().push(app_name.to_string());
        Ok(())
    }

    fn remove(&self, app_name: &str) -> Result<()> {
        self.removed.borrow_mut().push(app_name.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeResourceLimits {
    pub applied: RefCell<Vec<String>>,
}

impl ResourceLimits for FakeResourceLimits {
    fn apply(&self, app_name: &str) -> Result<()> {
        self.applied.borrow_mut().push(app_name.to_string());
        Ok(())
    }

    fn clear(&self, _app_name: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSmack {
    pub rules: RefCell<Vec<(String, String, String)>>,
}

impl Smack for FakeSmack {
    fn set_rule(&self, subject: &str, perms: &str, object: &str) -> Result<()> {
        self.rules
            .borrow_mut()
            .push((subject.to_string(), perms.to_string(), object.to_string()));
        Ok(())
    }

    fn revoke_subject(&self, label: &str) -> Result<()> {
        self.rules.borrow_mut().retain(|(s, _, _)| s != label);
        Ok(())
    }
}

pub struct FakeSmackLabels;

impl AppSmackLabels for FakeSmackLabels {
    fn label(&self, app_name: &str) -> String {
        format!("app::{}", app_name)
    }

    fn access_label(&self, app_name: &str, perms: &str) -> String {
        format!("app::{}::{}", app_name, perms)
    }
}

#[derive(Default)]
pub struct FakeFreezer {
    groups: RefCell<HashMap<String, Vec<Pid>>>,
    state: RefCell<HashMap<String, FreezerState>>,
    pub fault_on: RefCell<Option<String>>,
    /// Every `(app_name, signal)` pair passed to `send_signal`, in order, so
    /// tests can tell a soft SIGTERM apart from the escalated hard SIGKILL.
    pub signals_sent: RefCell<Vec<(String, Signal)>>,
}

impl FakeFreezer {
    pub fn new() -> Self {
        FakeFreezer::default()
    }
}

impl Freezer for FakeFreezer {
    fn freeze(&self, app_name: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .insert(app_name.to_string(), FreezerState::Frozen);
        Ok(())
    }

    fn thaw(&self, app_name: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .insert(app_name.to_string(), FreezerState::Thawed);
        Ok(())
    }

    fn state(&self, app_name: &str) -> FreezerState {
        if self.fault_on.borrow().as_deref() == Some(app_name) {
            return FreezerState::Fault;
        }
        self.state
            .borrow()
            .get(app_name)
            .copied()
            .unwrap_or(FreezerState::Thawed)
    }

    fn send_signal(&self, app_name: &str, sig: Signal) -> SendSignalResult {
        self.signals_sent.borrow_mut().push((app_name.to_string(), sig));
        if self.fault_on.borrow().as_deref() == Some(app_name) {
            return SendSignalResult::Fault;
        }
        match self.groups.borrow().get(app_name) {
            Some(pids) if !pids.is_empty() => SendSignalResult::Sent(pids.len()),
            _ => SendSignalResult::NoProcesses,
        }
    }

    fn is_empty(&self, app_name: &str) -> bool {
        self.groups
            .borrow()
            .get(app_name)
            .map(|p| p.is_empty())
            .unwrap_or(true)
    }

    fn track(&self, app_name: &str, pid: Pid) {
        self.groups
            .borrow_mut()
            .entry(app_name.to_string())
            .or_default()
            .push(pid);
    }

    fn untrack(&self, app_name: &str, pid: Pid) {
        if let Some(pids) = self.groups.borrow_mut().get_mut(app_name) {
            pids.retain(|p| *p != pid);
        }
    }
}

/// A `FakeFreezer` behind an `Rc`, for the same reason as
/// [`SharedFakeLauncher`]: `Supervisor` owns its freezer as an opaque
/// `Box<dyn Freezer>`, so a caller that wants to inspect `signals_sent`
/// after the fact needs a second handle onto the same fake.
#[derive(Clone, Default)]
pub struct SharedFakeFreezer(pub Rc<FakeFreezer>);

impl SharedFakeFreezer {
    pub fn new() -> Self {
        SharedFakeFreezer(Rc::new(FakeFreezer::new()))
    }

    pub fn signals_sent_to(&self, app_name: &str) -> Vec<Signal> {
        self.0
            .signals_sent
            .borrow()
            .iter()
            .filter(|(a, _)| a == app_name)
            .map(|(_, sig)| *sig)
            .collect()
    }
}

impl Freezer for SharedFakeFreezer {
    fn freeze(&self, app_name: &str) -> Result<()> {
        self.0.freeze(app_name)
    }

    fn thaw(&self, app_name: &str) -> Result<()> {
        self.0.thaw(app_name)
    }

    fn state(&self, app_name: &str) -> FreezerState {
        self.0.state(app_name)
    }

    fn send_signal(&self, app_name: &str, sig: Signal) -> SendSignalResult {
        self.0.send_signal(app_name, sig)
    }

    fn is_empty(&self, app_name: &str) -> bool {
        self.0.is_empty(app_name)
    }

    fn track(&self, app_name: &str, pid: Pid) {
        self.0.track(app_name, pid)
    }

    fn untrack(&self, app_name: &str, pid: Pid) {
        self.0.untrack(app_name, pid)
    }
}

#[derive(Default)]
pub struct FakeUserDb {
    ids: HashMap<String, (u32, u32)>,
    groups: RefCell<HashMap<String, u32>>,
    next_gid: RefCell<u32>,
}

impl FakeUserDb {
    pub fn new() -> Self {
        FakeUserDb {
            ids: HashMap::new(),
            groups: RefCell::new(HashMap::new()),
            next_gid: RefCell::new(5000),
        }
    }

    pub fn with_user(mut self, name: &str, uid: u32, gid: u32) -> Self {
        self.ids.insert(name.to_string(), (uid, gid));
        self
    }
}

impl UserDb for FakeUserDb {
    fn app_to_user_name(&self, app_name: &str) -> String {
        app_name.to_string()
    }

    fn ids_of(&self, name: &str) -> Option<(u32, u32)> {
        self.ids.get(name).copied()
    }

    fn create_group(&self, name: &str) -> Result<u32> {
        if let Some(gid) = self.groups.borrow().get(name) {
            return Ok(*gid);
        }
        let mut next = self.next_gid.borrow_mut();
        let gid = *next;
        *next += 1;
        self.groups.borrow_mut().insert(name.to_string(), gid);
        Ok(gid)
    }
}
