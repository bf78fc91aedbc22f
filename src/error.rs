use std::path::PathBuf;
use thiserror::Error;

/// The error kinds named in the core's error handling design (spec 7).
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("config path {0} has no value")]
    ConfigMissing(String),

    #[error("{what} exceeds its configured bound")]
    ConfigOverflow { what: String },

    #[error("failed to resolve {0}")]
    ResolveFailure(String),

    #[error("sandbox setup/teardown failed for app {0}: {1}")]
    SandboxFailure(String, String),

    #[error("failed to apply resource limits for app {0}: {1}")]
    ResourceLimitFailure(String, String),

    #[error("failed to launch process {proc} of app {app}: {reason}")]
    LaunchFailure {
        app: String,
        proc: String,
        reason: String,
    },

    #[error("app {0} is already running")]
    AlreadyRunning(String),

    #[error("app {0} is already stopped")]
    AlreadyStopped(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("freezer operation on {0} faulted")]
    FreezerFault(String),

    #[error("reboot-fault ledger I/O failed at {path}: {source}")]
    LedgerIOFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
