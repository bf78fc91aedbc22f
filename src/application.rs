//! `Application` (spec 4.1): construction, start/stop, process-exit and
//! watchdog dispatch, SMACK rule installation, and the two-phase kill.

use std::path::{Path, PathBuf};
use std::time::Instant;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::collab::{
    AppSmackLabels, Freezer, FreezerState, Launcher, LauncherProcState, ProcSpec, ResourceLimits,
    SendSignalResult, Sandbox, Smack, UserDb,
};
use crate::config::{ConfigTree, ConfigTxn};
use crate::consts::{
    APPS_ROOT, FREEZE_POLL_INTERVAL, FREEZE_POLL_TIMEOUT, KILL_TIMEOUT, MAX_SUPPLEMENTARY_GIDS,
    START_TIME,
};
use crate::error::{Result, SupervisorError};
use crate::fault::{
    parse_fault_action, parse_watchdog_action, reboot_limit_reached, restart_limit_reached,
    FaultPolicy, ProcFaultAction, WatchdogAction,
};
use crate::process::{ProcessObject, StopHandler};
use crate::reboot_ledger::RebootFaultLedger;
use crate::timer::OneShotTimer;

/// The seven non-empty subsets of `{r, w, x}` (spec 4.1.1).
const SELF_PERMISSIONS: [&str; 7] = ["r", "w", "x", "rw", "rx", "wx", "rwx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Stopped,
    Running,
}

/// The remediation the `Supervisor` must enact after a process-exit or
/// watchdog event (spec 4.1.3, 4.1.4, 4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppFaultAction {
    Ignore,
    RestartApp,
    StopApp,
    Reboot,
}

/// Outcome of `Application::watchdog_expired` (spec 4.1.4's dispatch table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    Handled,
    RestartApp,
    StopApp,
    Reboot,
    NotFound,
}

/// Bundles the six external collaborators (spec 6) so `Application` methods
/// take one argument instead of six. `launcher` is the only one `Application`
/// ever mutates through.
pub struct Collaborators<'a> {
    pub sandbox: &'a dyn Sandbox,
    pub resource_limits: &'a dyn ResourceLimits,
    pub smack: &'a dyn Smack,
    pub app_smack: &'a dyn AppSmackLabels,
    pub freezer: &'a dyn Freezer,
    pub user_db: &'a dyn UserDb,
    pub launcher: &'a mut dyn Launcher,
}

#[derive(Debug)]
pub struct Application {
    name: String,
    cfg_path: String,
    sandboxed: bool,
    install_path: PathBuf,
    sandbox_path: PathBuf,
    uid: u32,
    primary_gid: u32,
    supplementary_gids: Vec<u32>,
    state: AppState,
    processes: Vec<ProcessObject>,
    kill_timer: OneShotTimer,
    watchdog_action: Option<String>,
}

impl Application {
    /// Construction (spec 4.1 steps a-g). Any failure abandons construction;
    /// nothing here has filesystem side effects (those start in `start()`).
    pub fn construct(
        config: &ConfigTree,
        cfg_path: &str,
        collab: &Collaborators,
    ) -> Result<Application> {
        let cfg = config
            .open(cfg_path)
            .ok_or_else(|| SupervisorError::ConfigMissing(cfg_path.to_string()))?;
        let name = cfg.basename().to_string();
        let sandboxed = cfg.child_bool("sandboxed", true);

        let (uid, primary_gid, supplementary_gids) = if sandboxed {
            Self::resolve_identity(&cfg, &name, collab)?
        } else {
            (0, 0, Vec::new())
        };

        let install_path = APPS_ROOT.join(&name);
        let sandbox_path = if sandboxed {
            collab.sandbox.get_path(&name)?
        } else {
            PathBuf::new()
        };

        let processes = Self::construct_processes(&cfg)?;
        let watchdog_action = cfg.child_str("watchdogAction");

        Ok(Application {
            name,
            cfg_path: cfg.path().to_string(),
            sandboxed,
            install_path,
            sandbox_path,
            uid,
            primary_gid,
            supplementary_gids,
            state: AppState::Stopped,
            processes,
            kill_timer: OneShotTimer::default(),
            watchdog_action,
        })
    }

    fn resolve_identity(
        cfg: &ConfigTxn,
        name: &str,
        collab: &Collaborators,
    ) -> Result<(u32, u32, Vec<u32>)> {
        let user_name = collab.user_db.app_to_user_name(name);
        let (uid, primary_gid) = collab
            .user_db
            .ids_of(&user_name)
            .ok_or_else(|| SupervisorError::ResolveFailure(user_name.clone()))?;

        let mut supplementary_gids = Vec::new();
        if let Some(groups) = cfg.child("groups") {
            for group in groups.children() {
                if supplementary_gids.len() >= MAX_SUPPLEMENTARY_GIDS {
                    return Err(SupervisorError::ConfigOverflow {
                        what: format!("{}/groups", name),
                    });
                }
                let gid = collab.user_db.create_group(group.basename())?;
                supplementary_gids.push(gid);
            }
        }
        Ok((uid, primary_gid, supplementary_gids))
    }

    fn construct_processes(cfg: &ConfigTxn) -> Result<Vec<ProcessObject>> {
        let procs = match cfg.child("procs") {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for proc_cfg in procs.children() {
            let exe = proc_cfg
                .child_str("exe")
                .ok_or_else(|| SupervisorError::ConfigMissing(format!("{}/exe", proc_cfg.path())))?;
            let args = proc_cfg
                .child("args")
                .and_then(|c| c.as_str_array())
                .unwrap_or_default();
            let env = proc_cfg
                .child("env")
                .map(|e| {
                    e.children()
                        .filter_map(|c| c.as_str().map(|v| (c.basename().to_string(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let on_fault = proc_cfg
                .child_str("onFault")
                .map(|s| parse_fault_action(&s))
                .unwrap_or(ProcFaultAction::Restart);
            let watchdog_action = proc_cfg.child_str("watchdogAction");

            let spec = ProcSpec {
                name: proc_cfg.basename().to_string(),
                exe: PathBuf::from(exe),
                args,
                env,
                fault_policy: FaultPolicy { on_fault },
                watchdog_action,
            };
            out.push(ProcessObject::new(proc_cfg.path().to_string(), spec));
        }
        Ok(out)
    }

    /// `start()` (spec 4.1 i-iv).
    pub fn start(&mut self, config: &ConfigTree, collab: &mut Collaborators) -> Result<()> {
        if self.state == AppState::Running {
            return Err(SupervisorError::AlreadyRunning(self.name.clone()));
        }
        if self.sandboxed {
            collab.sandbox.setup(&self.name, self.uid, self.primary_gid)?;
        }
        collab.resource_limits.apply(&self.name)?;
        if let Err(e) = self.install_smack_rules(config, collab) {
            self.stop(collab);
            return Err(e);
        }
        for idx in 0..self.processes.len() {
            if let Err(e) = self.launch_process(idx, collab) {
                log::error!(target: "app", "{}: failed to launch {}: {}", self.name, self.processes[idx].name, e);
                self.stop(collab);
                return Err(e);
            }
        }
        self.state = AppState::Running;
        Ok(())
    }

    fn launch_process(&mut self, idx: usize, collab: &mut Collaborators) -> Result<()> {
        let spec = self.processes[idx].spec.clone();
        let pid = if self.sandboxed {
            collab.launcher.start_sandboxed(
                &spec,
                Path::new("/"),
                self.uid,
                self.primary_gid,
                &self.supplementary_gids,
                &self.sandbox_path,
            )?
        } else {
            collab.launcher.start(&spec, &self.install_path)?
        };
        self.processes[idx].pid = Some(pid);
        self.processes[idx].stopping = false;
        collab.freezer.track(&self.name, pid);
        Ok(())
    }

    /// SMACK rule installation (spec 4.1.1), reading `bindings` fresh.
    fn install_smack_rules(&self, config: &ConfigTree, collab: &Collaborators) -> Result<()> {
        let label = collab.app_smack.label(&self.name);
        for perm in SELF_PERMISSIONS.iter() {
            let object = collab.app_smack.access_label(&self.name, perm);
            collab.smack.set_rule(&label, perm, &object)?;
        }
        collab.smack.set_rule("framework", "w", &label)?;
        collab.smack.set_rule(&label, "rw", "framework")?;

        if let Some(cfg) = config.open(&self.cfg_path) {
            if let Some(bindings) = cfg.child("bindings") {
                for binding in bindings.children() {
                    if let Some(server) = binding.child_str("app") {
                        if server.is_empty() {
                            continue;
                        }
                        let server_label = collab.app_smack.label(&server);
                        collab.smack.set_rule(&label, "rw", &server_label)?;
                        collab.smack.set_rule(&server_label, "rw", &label)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `stop()` (spec 4.1): issue a soft kill, armed to escalate to hard
    /// kill after `KILL_TIMEOUT` unless the group empties first.
    pub fn stop(&mut self, collab: &mut Collaborators) {
        if self.state == AppState::Stopped {
            log::warn!(target: "app", "{}: stop() called while already stopped", self.name);
            return;
        }
        self.group_kill(Signal::SIGTERM, collab);
        if collab.freezer.is_empty(&self.name) {
            self.kill_timer.cancel();
            self.cleanup(collab);
            self.state = AppState::Stopped;
            return;
        }
        if !self.kill_timer.is_armed() {
            self.kill_timer.arm(KILL_TIMEOUT);
        }
    }

    /// Polled once per event-loop tick (spec 5); fires the hard kill when
    /// the soft-kill grace period has elapsed (spec 4.1.2).
    pub fn poll_kill_timer(&mut self, collab: &mut Collaborators) {
        if self.state != AppState::Running || !self.kill_timer.poll_expired() {
            return;
        }
        self.group_kill(Signal::SIGKILL, collab);
        if collab.freezer.is_empty(&self.name) {
            self.cleanup(collab);
            self.state = AppState::Stopped;
        }
    }

    /// Two-phase group kill (spec 4.1.2): freeze, mark + clear handlers,
    /// signal, thaw.
    fn group_kill(&mut self, sig: Signal, collab: &mut Collaborators) {
        if let Err(e) = collab.freezer.freeze(&self.name) {
            log::warn!(target: "freezer", "{}: freeze failed: {}", self.name, e);
        }
        let deadline = Instant::now() + FREEZE_POLL_TIMEOUT;
        loop {
            match collab.freezer.state(&self.name) {
                FreezerState::Frozen | FreezerState::Fault => break,
                _ if Instant::now() >= deadline => {
                    log::warn!(target: "freezer", "{}: timed out waiting to freeze", self.name);
                    break;
                }
                _ => std::thread::sleep(FREEZE_POLL_INTERVAL),
            }
        }

        for proc in self.processes.iter_mut() {
            if let Some(pid) = proc.pid {
                if collab.launcher.state(pid) != LauncherProcState::Stopped {
                    proc.stop_handler = None;
                    proc.stopping = true;
                }
            }
        }

        match collab.freezer.send_signal(&self.name, sig) {
            SendSignalResult::Sent(n) => {
                log::debug!(target: "freezer", "{}: signalled {} process(es) with {:?}", self.name, n, sig);
            }
            SendSignalResult::NoProcesses => {}
            SendSignalResult::Fault => {
                log::warn!(target: "freezer", "{}: send_signal faulted, proceeding to cleanup", self.name);
            }
        }

        if let Err(e) = collab.freezer.thaw(&self.name) {
            log::warn!(target: "freezer", "{}: thaw failed: {}", self.name, e);
        }
    }

    /// Per-process kill for the watchdog path (spec 4.1.4 `StopProc`):
    /// does not touch `stop_handler`, which the caller sets separately.
    fn stop_proc(&mut self, idx: usize, collab: &mut Collaborators) {
        if let Some(pid) = self.processes[idx].pid {
            self.processes[idx].stopping = true;
            if let Err(e) = collab.launcher.send_signal(pid, Signal::SIGKILL) {
                log::warn!(target: "proc", "{}: failed to signal {}: {}", self.name, self.processes[idx].name, e);
            }
        }
    }

    /// `sigchild()` (spec 4.1.3).
    pub fn sigchild(
        &mut self,
        pid: Pid,
        status: WaitStatus,
        collab: &mut Collaborators,
        ledger: &RebootFaultLedger,
    ) -> AppFaultAction {
        let idx = match self.processes.iter().position(|p| p.pid == Some(pid)) {
            Some(idx) => idx,
            None => return AppFaultAction::Ignore,
        };

        let now = START_TIME.elapsed();
        let prev_fault_time = self.processes[idx].fault_time;
        let was_stopping = self.processes[idx].stopping;
        self.processes[idx].pid = None;
        self.processes[idx].stopping = false;
        collab.freezer.untrack(&self.name, pid);

        let mut action = if was_stopping {
            ProcFaultAction::NoFault
        } else {
            self.processes[idx].spec.fault_policy.classify(&status)
        };

        if !matches!(action, ProcFaultAction::NoFault | ProcFaultAction::Ignore) {
            self.processes[idx].fault_time = Some(now);
        }

        let proc_name = self.processes[idx].name.clone();
        let limit_reached = match action {
            ProcFaultAction::Restart | ProcFaultAction::RestartApp => {
                restart_limit_reached(prev_fault_time, now)
            }
            ProcFaultAction::Reboot => reboot_limit_reached(ledger.is_for(&self.name, &proc_name)),
            _ => false,
        };
        if limit_reached {
            log::warn!(target: "fault", "{}/{}: fault limit reached, downgrading to StopApp", self.name, proc_name);
            action = ProcFaultAction::StopApp;
        }

        let result = match action {
            ProcFaultAction::NoFault => match self.processes[idx].stop_handler.take() {
                Some(StopHandler::StartProc) => match self.launch_process(idx, collab) {
                    Ok(()) => AppFaultAction::Ignore,
                    Err(e) => {
                        log::error!(target: "proc", "{}/{}: restart failed: {}", self.name, proc_name, e);
                        AppFaultAction::StopApp
                    }
                },
                None => AppFaultAction::Ignore,
            },
            ProcFaultAction::Ignore => {
                log::info!(target: "fault", "{}/{}: exit ignored by policy", self.name, proc_name);
                AppFaultAction::Ignore
            }
            ProcFaultAction::Restart => match self.launch_process(idx, collab) {
                Ok(()) => AppFaultAction::Ignore,
                Err(e) => {
                    log::error!(target: "proc", "{}/{}: restart failed: {}", self.name, proc_name, e);
                    AppFaultAction::StopApp
                }
            },
            ProcFaultAction::RestartApp => AppFaultAction::RestartApp,
            ProcFaultAction::StopApp => AppFaultAction::StopApp,
            ProcFaultAction::Reboot => {
                if let Err(e) = ledger.write(&self.name, &proc_name) {
                    log::warn!(target: "ledger", "{}/{}: failed to persist reboot fault: {}", self.name, proc_name, e);
                }
                AppFaultAction::Reboot
            }
        };

        if collab.freezer.is_empty(&self.name) {
            self.kill_timer.cancel();
            self.cleanup(collab);
            self.state = AppState::Stopped;
        }

        result
    }

    /// `watchdog_expired()` (spec 4.1.4).
    pub fn watchdog_expired(&mut self, pid: Pid, collab: &mut Collaborators) -> WatchdogOutcome {
        let idx = match self.processes.iter().position(|p| p.pid == Some(pid)) {
            Some(idx) => idx,
            None => return WatchdogOutcome::NotFound,
        };

        let mut action = self.processes[idx]
            .spec
            .watchdog_action
            .as_deref()
            .map(parse_watchdog_action)
            .unwrap_or(WatchdogAction::NotFound);

        if matches!(action, WatchdogAction::NotFound | WatchdogAction::Error) {
            action = self
                .watchdog_action
                .as_deref()
                .map(parse_watchdog_action)
                .unwrap_or(WatchdogAction::NotFound);
        }

        if matches!(action, WatchdogAction::NotFound | WatchdogAction::Error) {
            log::warn!(target: "proc", "{}/{}: no watchdogAction configured, defaulting to restart", self.name, self.processes[idx].name);
            action = WatchdogAction::Restart;
        }

        match action {
            WatchdogAction::Ignore => {
                log::info!(target: "proc", "{}/{}: watchdog expiry ignored", self.name, self.processes[idx].name);
                WatchdogOutcome::Handled
            }
            WatchdogAction::Stop => {
                self.stop_proc(idx, collab);
                WatchdogOutcome::Handled
            }
            WatchdogAction::Restart => {
                self.processes[idx].stop_handler = Some(StopHandler::StartProc);
                self.stop_proc(idx, collab);
                WatchdogOutcome::Handled
            }
            WatchdogAction::RestartApp => WatchdogOutcome::RestartApp,
            WatchdogAction::StopApp => WatchdogOutcome::StopApp,
            WatchdogAction::Reboot => WatchdogOutcome::Reboot,
            WatchdogAction::NotFound | WatchdogAction::Error => unreachable!(),
        }
    }

    /// Cleanup (spec 4.1.6): run on every transition to `Stopped`.
    fn cleanup(&mut self, collab: &Collaborators) {
        let label = collab.app_smack.label(&self.name);
        if let Err(e) = collab.smack.revoke_subject(&label) {
            log::warn!(target: "smack", "{}: revoke_subject failed: {}", self.name, e);
        }
        if self.sandboxed {
            if let Err(e) = collab.sandbox.remove(&self.name) {
                log::warn!(target: "sandbox", "{}: remove failed: {}", self.name, e);
            }
        }
        if let Err(e) = collab.resource_limits.clear(&self.name) {
            log::warn!(target: "app", "{}: resource_limits.clear failed: {}", self.name, e);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cfg_path(&self) -> &str {
        &self.cfg_path
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn sandboxed(&self) -> bool {
        self.sandboxed
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn primary_gid(&self) -> u32 {
        self.primary_gid
    }

    pub fn supplementary_gids(&self) -> &[u32] {
        &self.supplementary_gids
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn sandbox_path(&self) -> &Path {
        &self.sandbox_path
    }

    pub fn processes(&self) -> &[ProcessObject] {
        &self.processes
    }

    pub fn owns_pid(&self, pid: Pid) -> bool {
        self.processes.iter().any(|p| p.pid == Some(pid))
    }

    /// `proc_state(name)` (spec 4.1 Queries).
    pub fn proc_state(&self, name: &str, collab: &Collaborators) -> LauncherProcState {
        if self.state == AppState::Stopped {
            return LauncherProcState::Stopped;
        }
        self.processes
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.pid)
            .map(|pid| collab.launcher.state(pid))
            .unwrap_or(LauncherProcState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fake::{
        FakeFreezer, FakeLauncher, FakeResourceLimits, FakeSandbox, FakeSmack, FakeSmackLabels,
        FakeUserDb,
    };
    use std::path::PathBuf;

    fn collab<'a>(
        sandbox: &'a FakeSandbox,
        resource_limits: &'a FakeResourceLimits,
        smack: &'a FakeSmack,
        app_smack: &'a FakeSmackLabels,
        freezer: &'a FakeFreezer,
        user_db: &'a FakeUserDb,
        launcher: &'a mut FakeLauncher,
    ) -> Collaborators<'a> {
        Collaborators {
            sandbox,
            resource_limits,
            smack,
            app_smack,
            freezer,
            user_db,
            launcher,
        }
    }

    const CFG: &str = r#"
        [apps.a]
        sandboxed = false

        [apps.a.procs.p]
        exe = "/bin/p"
        onFault = "restart"
    "#;

    #[test]
    fn construct_unsandboxed_has_no_identity() {
        let tree = ConfigTree::parse(CFG).unwrap();
        let sandbox = FakeSandbox::new(PathBuf::from("/sandbox"));
        let resource_limits = FakeResourceLimits::default();
        let smack = FakeSmack::default();
        let app_smack = FakeSmackLabels;
        let freezer = FakeFreezer::new();
        let user_db = FakeUserDb::new();
        let mut launcher = FakeLauncher::new();
        let c = collab(
            &sandbox,
            &resource_limits,
            &smack,
            &app_smack,
            &freezer,
            &user_db,
            &mut launcher,
        );
        let app = Application::construct(&tree, "apps/a", &c).unwrap();
        assert_eq!(app.name(), "a");
        assert_eq!(app.uid(), 0);
        assert_eq!(app.state(), AppState::Stopped);
        assert_eq!(app.processes().len(), 1);
    }

    #[test]
    fn start_then_sigchild_noerror_stops_app() {
        let tree = ConfigTree::parse(CFG).unwrap();
        let sandbox = FakeSandbox::new(PathBuf::from("/sandbox"));
        let resource_limits = FakeResourceLimits::default();
        let smack = FakeSmack::default();
        let app_smack = FakeSmackLabels;
        let freezer = FakeFreezer::new();
        let user_db = FakeUserDb::new();
        let mut launcher = FakeLauncher::new();
        let ledger = RebootFaultLedger::at_path(std::env::temp_dir().join("app_test_ledger"));

        let mut app = {
            let c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            Application::construct(&tree, "apps/a", &c).unwrap()
        };

        {
            let mut c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            app.start(&tree, &mut c).unwrap();
        }
        assert_eq!(app.state(), AppState::Running);
        let pid = app.processes()[0].pid.unwrap();

        launcher.finish(pid, WaitStatus::Exited(pid, 0));
        let reaped = launcher.reap();
        assert_eq!(reaped.len(), 1);
        {
            let mut c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            let action = app.sigchild(reaped[0].0, reaped[0].1, &mut c, &ledger);
            assert_eq!(action, AppFaultAction::Ignore);
        }
        assert_eq!(app.state(), AppState::Stopped);
        let _ = std::fs::remove_file(ledger.path());
    }

    const CFG_WITH_BINDING: &str = r#"
        [apps.a]
        sandboxed = false
        [apps.a.procs.p]
        exe = "/bin/p"

        [apps.a.bindings.b]
        app = "b"
    "#;

    #[test]
    fn start_installs_binding_rules_both_ways() {
        let tree = ConfigTree::parse(CFG_WITH_BINDING).unwrap();
        let sandbox = FakeSandbox::new(PathBuf::from("/sandbox"));
        let resource_limits = FakeResourceLimits::default();
        let smack = FakeSmack::default();
        let app_smack = FakeSmackLabels;
        let freezer = FakeFreezer::new();
        let user_db = FakeUserDb::new();
        let mut launcher = FakeLauncher::new();

        let mut app = {
            let c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            Application::construct(&tree, "apps/a", &c).unwrap()
        };
        {
            let mut c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            app.start(&tree, &mut c).unwrap();
        }

        let rules = smack.rules.borrow();
        assert!(rules.iter().any(|(s, p, o)| s == "app::a" && p == "rw" && o == "app::b"));
        assert!(rules.iter().any(|(s, p, o)| s == "app::b" && p == "rw" && o == "app::a"));
    }

    fn cfg_with_n_groups(n: usize) -> String {
        let mut groups = String::new();
        for i in 0..n {
            groups.push_str(&format!("[apps.a.groups.g{}]\n", i));
        }
        format!(
            r#"
            [apps.a]
            sandboxed = true
            [apps.a.procs.p]
            exe = "/bin/p"
            {}
            "#,
            groups
        )
    }

    #[test]
    fn supplementary_gids_exactly_at_cap_succeeds() {
        let text = cfg_with_n_groups(MAX_SUPPLEMENTARY_GIDS);
        let tree = ConfigTree::parse(&text).unwrap();
        let sandbox = FakeSandbox::new(PathBuf::from("/sandbox"));
        let resource_limits = FakeResourceLimits::default();
        let smack = FakeSmack::default();
        let app_smack = FakeSmackLabels;
        let freezer = FakeFreezer::new();
        let user_db = FakeUserDb::new().with_user("a", 1000, 1000);
        let mut launcher = FakeLauncher::new();
        let c = collab(
            &sandbox,
            &resource_limits,
            &smack,
            &app_smack,
            &freezer,
            &user_db,
            &mut launcher,
        );
        let app = Application::construct(&tree, "apps/a", &c).unwrap();
        assert_eq!(app.supplementary_gids().len(), MAX_SUPPLEMENTARY_GIDS);
    }

    #[test]
    fn supplementary_gids_one_over_cap_fails_construction() {
        let text = cfg_with_n_groups(MAX_SUPPLEMENTARY_GIDS + 1);
        let tree = ConfigTree::parse(&text).unwrap();
        let sandbox = FakeSandbox::new(PathBuf::from("/sandbox"));
        let resource_limits = FakeResourceLimits::default();
        let smack = FakeSmack::default();
        let app_smack = FakeSmackLabels;
        let freezer = FakeFreezer::new();
        let user_db = FakeUserDb::new().with_user("a", 1000, 1000);
        let mut launcher = FakeLauncher::new();
        let c = collab(
            &sandbox,
            &resource_limits,
            &smack,
            &app_smack,
            &freezer,
            &user_db,
            &mut launcher,
        );
        let err = Application::construct(&tree, "apps/a", &c).unwrap_err();
        assert!(matches!(err, SupervisorError::ConfigOverflow { .. }));
    }

    const CFG_NO_PROCS: &str = r#"
        [apps.a]
        sandboxed = false
    "#;

    #[test]
    fn empty_procs_starts_and_stops_immediately() {
        let tree = ConfigTree::parse(CFG_NO_PROCS).unwrap();
        let sandbox = FakeSandbox::new(PathBuf::from("/sandbox"));
        let resource_limits = FakeResourceLimits::default();
        let smack = FakeSmack::default();
        let app_smack = FakeSmackLabels;
        let freezer = FakeFreezer::new();
        let user_db = FakeUserDb::new();
        let mut launcher = FakeLauncher::new();

        let mut app = {
            let c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            Application::construct(&tree, "apps/a", &c).unwrap()
        };
        assert!(app.processes().is_empty());

        {
            let mut c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            app.start(&tree, &mut c).unwrap();
        }
        assert_eq!(app.state(), AppState::Running);

        {
            let mut c = collab(
                &sandbox,
                &resource_limits,
                &smack,
                &app_smack,
                &freezer,
                &user_db,
                &mut launcher,
            );
            app.stop(&mut c);
        }
        // No processes were ever tracked, so the freezer group is already
        // empty and stop() drives straight to Stopped without arming the
        // hard-kill timer.
        assert_eq!(app.state(), AppState::Stopped);
    }
}
