//! Structured status snapshots (SPEC_FULL C): a point-in-time view of the
//! supervisor and its applications, serializable for an external status
//! surface even though that transport itself is out of scope.

use serde::Serialize;

use crate::application::{AppState, Application};
use crate::collab::LauncherProcState;
use crate::supervisor::{AppHandle, Supervisor};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    pub name: String,
    pub pid: Option<i32>,
    pub state: LauncherProcState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatus {
    pub handle: AppHandle,
    pub name: String,
    pub state: AppState,
    pub sandboxed: bool,
    pub processes: Vec<ProcessStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub apps: Vec<ApplicationStatus>,
}

impl ApplicationStatus {
    fn snapshot(handle: AppHandle, app: &Application) -> ApplicationStatus {
        let processes = app
            .processes()
            .iter()
            .map(|p| ProcessStatus {
                name: p.name.clone(),
                pid: p.pid.map(|pid| pid.as_raw()),
                state: if app.state() == AppState::Stopped {
                    LauncherProcState::Stopped
                } else if p.is_running() {
                    LauncherProcState::Running
                } else {
                    LauncherProcState::Stopped
                },
            })
            .collect();
        ApplicationStatus {
            handle,
            name: app.name().to_string(),
            state: app.state(),
            sandboxed: app.sandboxed(),
            processes,
        }
    }
}

impl SupervisorStatus {
    pub fn snapshot(supervisor: &Supervisor) -> SupervisorStatus {
        SupervisorStatus {
            apps: supervisor
                .apps_iter()
                .map(|(h, a)| ApplicationStatus::snapshot(h, a))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_supervisor_status_serializes() {
        let status = SupervisorStatus { apps: Vec::new() };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"apps":[]}"#);
    }
}
