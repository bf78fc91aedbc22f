//! `ProcessObject` (spec 3): per-process state exclusively owned by its
//! `Application` — the launcher-side spec, current pid, last-fault
//! timestamp, and the watchdog-path's deferred restart handler.

use std::time::Duration;

use nix::unistd::Pid;

use crate::collab::ProcSpec;

/// Set only by the watchdog path (spec 4.1.4): "when the subsequent exit is
/// classified NoFault, relaunch this process."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopHandler {
    StartProc,
}

#[derive(Debug)]
pub struct ProcessObject {
    pub name: String,
    pub cfg_path: String,
    pub spec: ProcSpec,
    pub pid: Option<Pid>,
    pub fault_time: Option<Duration>,
    /// Set between a supervisor- or watchdog-initiated kill and the exit
    /// event that reaps it, so that exit is classified as deliberate
    /// (spec 3 invariants, 4.1.2 step 2).
    pub stopping: bool,
    pub stop_handler: Option<StopHandler>,
}

impl ProcessObject {
    pub fn new(cfg_path: String, spec: ProcSpec) -> Self {
        ProcessObject {
            name: spec.name.clone(),
            cfg_path,
            spec,
            pid: None,
            fault_time: None,
            stopping: false,
            stop_handler: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultPolicy;
    use std::path::PathBuf;

    fn spec(name: &str) -> ProcSpec {
        ProcSpec {
            name: name.to_string(),
            exe: PathBuf::from("/bin/true"),
            args: vec![],
            env: vec![],
            fault_policy: FaultPolicy::default(),
            watchdog_action: None,
        }
    }

    #[test]
    fn fresh_process_is_not_running() {
        let p = ProcessObject::new("apps/a/procs/p".to_string(), spec("p"));
        assert!(!p.is_running());
        assert!(p.stop_handler.is_none());
    }
}
