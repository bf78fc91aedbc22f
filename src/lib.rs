//! Application/process lifecycle supervisor core: a two-level state machine
//! (application, process), fault-action decision logic, fault-limit
//! accounting, watchdog-timeout dispatch, and two-phase process
//! termination, built against a set of external collaborators (config tree,
//! sandbox, resource limits, SMACK, cgroup freezer, user/group database,
//! launcher) whose concrete POSIX implementations live in `collab::system`.

#[macro_use]
extern crate lazy_static;

pub mod application;
pub mod collab;
pub mod config;
pub mod consts;
pub mod error;
pub mod fault;
pub mod logger;
pub mod process;
pub mod reboot_ledger;
pub mod status;
pub mod supervisor;
pub mod timer;

pub use application::{AppFaultAction, AppState, Application, Collaborators, WatchdogOutcome};
pub use error::{Result, SupervisorError};
pub use supervisor::{AppHandle, Supervisor, SupervisorEvent};
