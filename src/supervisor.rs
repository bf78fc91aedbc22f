//! `Supervisor` (spec 4.4): the arena-owned registry of applications and the
//! event dispatcher — SIGCHLD fanout, watchdog fanout, and lifecycle
//! commands. Single-threaded and cooperative (spec 5): `tick()` is the only
//! entry point that may block, and only for the freeze-poll bound inside a
//! kill.

use std::path::PathBuf;

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use slab::Slab;

use crate::application::{AppFaultAction, Application, Collaborators, WatchdogOutcome};
use crate::collab::{AppSmackLabels, Freezer, Launcher, ResourceLimits, Sandbox, Smack, UserDb};
use crate::config::ConfigTree;
use crate::error::{Result, SupervisorError};
use crate::reboot_ledger::RebootFaultLedger;

/// Opaque handle into the application arena (Design Notes 9: "small integer
/// IDs, enabling safe sharing ... without cycles").
pub type AppHandle = usize;

/// What the embedding caller must do after a `Supervisor` event callback
/// (spec 4.4's `Reboot` dispatch: "initiate system reboot" is outside the
/// core's own mandate, so it is surfaced rather than acted on directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    None,
    RebootRequested(AppHandle),
}

pub struct Supervisor {
    apps: Slab<Application>,
    config: ConfigTree,
    ledger: RebootFaultLedger,
    reboot_grace_timer: crate::timer::OneShotTimer,
    sandbox: Box<dyn Sandbox>,
    resource_limits: Box<dyn ResourceLimits>,
    smack: Box<dyn Smack>,
    app_smack: Box<dyn AppSmackLabels>,
    freezer: Box<dyn Freezer>,
    user_db: Box<dyn UserDb>,
    launcher: Box<dyn Launcher>,
}

#[allow(clippy::too_many_arguments)]
impl Supervisor {
    pub fn new(
        config: ConfigTree,
        ledger_path: PathBuf,
        sandbox: Box<dyn Sandbox>,
        resource_limits: Box<dyn ResourceLimits>,
        smack: Box<dyn Smack>,
        app_smack: Box<dyn AppSmackLabels>,
        freezer: Box<dyn Freezer>,
        user_db: Box<dyn UserDb>,
        launcher: Box<dyn Launcher>,
    ) -> Supervisor {
        let mut reboot_grace_timer = crate::timer::OneShotTimer::default();
        reboot_grace_timer.arm(crate::fault::reboot_grace_interval());
        Supervisor {
            apps: Slab::new(),
            config,
            ledger: RebootFaultLedger::at_path(ledger_path),
            reboot_grace_timer,
            sandbox,
            resource_limits,
            smack,
            app_smack,
            freezer,
            user_db,
            launcher,
        }
    }

    /// Constructs and registers an application from its config path.
    pub fn construct_app(&mut self, cfg_path: &str) -> Result<AppHandle> {
        let collab = Collaborators {
            sandbox: self.sandbox.as_ref(),
            resource_limits: self.resource_limits.as_ref(),
            smack: self.smack.as_ref(),
            app_smack: self.app_smack.as_ref(),
            freezer: self.freezer.as_ref(),
            user_db: self.user_db.as_ref(),
            launcher: self.launcher.as_mut(),
        };
        let app = Application::construct(&self.config, cfg_path, &collab)?;
        Ok(self.apps.insert(app))
    }

    /// Destroys an application; spec 3: "deletion requires Stopped".
    pub fn destroy_app(&mut self, handle: AppHandle) -> Result<()> {
        let app = self
            .apps
            .get(handle)
            .ok_or_else(|| SupervisorError::NotFound(format!("app handle {}", handle)))?;
        if app.state() == crate::application::AppState::Running {
            return Err(SupervisorError::AlreadyRunning(app.name().to_string()));
        }
        self.apps.remove(handle);
        Ok(())
    }

    pub fn start_app(&mut self, handle: AppHandle) -> Result<()> {
        let config = self.config.clone();
        let mut collab = Collaborators {
            sandbox: self.sandbox.as_ref(),
            resource_limits: self.resource_limits.as_ref(),
            smack: self.smack.as_ref(),
            app_smack: self.app_smack.as_ref(),
            freezer: self.freezer.as_ref(),
            user_db: self.user_db.as_ref(),
            launcher: self.launcher.as_mut(),
        };
        let app = self
            .apps
            .get_mut(handle)
            .ok_or_else(|| SupervisorError::NotFound(format!("app handle {}", handle)))?;
        app.start(&config, &mut collab)
    }

    pub fn stop_app(&mut self, handle: AppHandle) -> Result<()> {
        let mut collab = Collaborators {
            sandbox: self.sandbox.as_ref(),
            resource_limits: self.resource_limits.as_ref(),
            smack: self.smack.as_ref(),
            app_smack: self.app_smack.as_ref(),
            freezer: self.freezer.as_ref(),
            user_db: self.user_db.as_ref(),
            launcher: self.launcher.as_mut(),
        };
        let app = self
            .apps
            .get_mut(handle)
            .ok_or_else(|| SupervisorError::NotFound(format!("app handle {}", handle)))?;
        app.stop(&mut collab);
        Ok(())
    }

    pub fn app(&self, handle: AppHandle) -> Option<&Application> {
        self.apps.get(handle)
    }

    pub fn find_app_by_name(&self, name: &str) -> Option<AppHandle> {
        self.apps.iter().find(|(_, a)| a.name() == name).map(|(h, _)| h)
    }

    fn app_owning_pid(&self, pid: Pid) -> Option<AppHandle> {
        self.apps
            .iter()
            .find(|(_, app)| app.owns_pid(pid))
            .map(|(h, _)| h)
    }

    /// Routes a reaped `(pid, status)` to its owning application (spec 4.4:
    /// "if no app claims the PID, ignore") and enacts the returned
    /// `AppFaultAction`.
    pub fn dispatch_sigchild(&mut self, pid: Pid, status: WaitStatus) -> SupervisorEvent {
        let handle = match self.app_owning_pid(pid) {
            Some(h) => h,
            None => return SupervisorEvent::None,
        };
        let action = {
            let mut collab = Collaborators {
                sandbox: self.sandbox.as_ref(),
                resource_limits: self.resource_limits.as_ref(),
                smack: self.smack.as_ref(),
                app_smack: self.app_smack.as_ref(),
                freezer: self.freezer.as_ref(),
                user_db: self.user_db.as_ref(),
                launcher: self.launcher.as_mut(),
            };
            let app = &mut self.apps[handle];
            app.sigchild(pid, status, &mut collab, &self.ledger)
        };
        self.enact(handle, action)
    }

    /// Routes a watchdog expiry to its owning application (spec 4.4).
    pub fn dispatch_watchdog(&mut self, pid: Pid) -> SupervisorEvent {
        let handle = match self.app_owning_pid(pid) {
            Some(h) => h,
            None => return SupervisorEvent::None,
        };
        let outcome = {
            let mut collab = Collaborators {
                sandbox: self.sandbox.as_ref(),
                resource_limits: self.resource_limits.as_ref(),
                smack: self.smack.as_ref(),
                app_smack: self.app_smack.as_ref(),
                freezer: self.freezer.as_ref(),
                user_db: self.user_db.as_ref(),
                launcher: self.launcher.as_mut(),
            };
            let app = &mut self.apps[handle];
            app.watchdog_expired(pid, &mut collab)
        };
        match outcome {
            WatchdogOutcome::Handled | WatchdogOutcome::NotFound => SupervisorEvent::None,
            WatchdogOutcome::RestartApp => self.enact(handle, AppFaultAction::RestartApp),
            WatchdogOutcome::StopApp => self.enact(handle, AppFaultAction::StopApp),
            WatchdogOutcome::Reboot => self.enact(handle, AppFaultAction::Reboot),
        }
    }

    /// `AppFaultAction` dispatch (spec 4.4): `Ignore` -> nothing, `RestartApp`
    /// -> stop then start, `StopApp` -> stop, `Reboot` -> surfaced to the
    /// caller as a `SupervisorEvent`.
    fn enact(&mut self, handle: AppHandle, action: AppFaultAction) -> SupervisorEvent {
        match action {
            AppFaultAction::Ignore => SupervisorEvent::None,
            AppFaultAction::StopApp => {
                if let Err(e) = self.stop_app(handle) {
                    log::warn!(target: "app", "stop_app({}) failed: {}", handle, e);
                }
                SupervisorEvent::None
            }
            AppFaultAction::RestartApp => {
                if let Err(e) = self.stop_app(handle) {
                    log::warn!(target: "app", "restart: stop phase of {} failed: {}", handle, e);
                }
                if let Err(e) = self.start_app(handle) {
                    log::error!(target: "app", "restart: start phase of {} failed: {}", handle, e);
                }
                SupervisorEvent::None
            }
            AppFaultAction::Reboot => SupervisorEvent::RebootRequested(handle),
        }
    }

    /// One event-loop tick (spec 5): reaps exited children, drains their
    /// fanout, polls every app's kill timer, and polls the reboot-grace
    /// timer.
    pub fn tick(&mut self) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();

        let reaped = self.launcher.reap();
        for (pid, status) in reaped {
            let event = self.dispatch_sigchild(pid, status);
            if event != SupervisorEvent::None {
                events.push(event);
            }
        }

        let handles: Vec<AppHandle> = self.apps.iter().map(|(h, _)| h).collect();
        for handle in handles {
            let mut collab = Collaborators {
                sandbox: self.sandbox.as_ref(),
                resource_limits: self.resource_limits.as_ref(),
                smack: self.smack.as_ref(),
                app_smack: self.app_smack.as_ref(),
                freezer: self.freezer.as_ref(),
                user_db: self.user_db.as_ref(),
                launcher: self.launcher.as_mut(),
            };
            if let Some(app) = self.apps.get_mut(handle) {
                app.poll_kill_timer(&mut collab);
            }
        }

        if self.reboot_grace_timer.poll_expired() {
            self.ledger.clear();
        }

        events
    }

    pub fn status(&self) -> crate::status::SupervisorStatus {
        crate::status::SupervisorStatus::snapshot(self)
    }

    pub fn apps_iter(&self) -> impl Iterator<Item = (AppHandle, &Application)> {
        self.apps.iter()
    }

    pub fn ledger_path(&self) -> &std::path::Path {
        self.ledger.path()
    }
}
