use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use structopt::StructOpt;

use signal_hook::consts::{SIGINT, SIGTERM};

use supervisor_core::collab::fake::{
    FakeFreezer, FakeLauncher, FakeResourceLimits, FakeSandbox, FakeSmack, FakeSmackLabels,
    FakeUserDb,
};
use supervisor_core::collab::system::{
    SystemFreezer, SystemLauncher, SystemResourceLimits, SystemSandbox, SystemSmack,
    SystemSmackLabels, SystemUserDb,
};
use supervisor_core::config::ConfigTree;
use supervisor_core::consts::REBOOT_FAULT_RECORD_PATH;
use supervisor_core::logger;
use supervisor_core::{Supervisor, SupervisorEvent};

#[derive(StructOpt, Debug)]
#[structopt(name = "supervisord", about = "Application/process lifecycle supervisor")]
struct Opt {
    /// Path to the top-level config file (TOML) holding the `apps` tree.
    #[structopt(long, parse(from_os_str))]
    config: PathBuf,

    /// Root under which sandboxed apps' chroots are assembled.
    #[structopt(long, parse(from_os_str), default_value = "/opt/sandbox")]
    sandbox_root: PathBuf,

    /// Root of the freezer cgroup hierarchy.
    #[structopt(long, parse(from_os_str), default_value = "/sys/fs/cgroup/freezer/supervisor")]
    freezer_root: PathBuf,

    /// Logging verbosity.
    #[structopt(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Write logs to this file in addition to stderr; defaults to a
    /// timestamped file under the supervisor log directory.
    #[structopt(long, parse(from_os_str))]
    log_file: Option<PathBuf>,

    /// Run with in-memory fakes instead of real POSIX collaborators, for
    /// smoke-testing a config file without root privileges.
    #[structopt(long)]
    dry_run: bool,
}

fn run(opt: Opt) -> Result<()> {
    let log_file = opt.log_file.clone().or_else(|| Some(logger::default_log_file_path()));
    logger::init(opt.log_level, log_file);

    let text = fs::read_to_string(&opt.config)
        .with_context(|| format!("failed to read config file {}", opt.config.display()))?;
    let config = ConfigTree::parse(&text)
        .with_context(|| format!("failed to parse config file {}", opt.config.display()))?;

    let mut supervisor = if opt.dry_run {
        Supervisor::new(
            config.clone(),
            REBOOT_FAULT_RECORD_PATH.clone(),
            Box::new(FakeSandbox::new(opt.sandbox_root.clone())),
            Box::new(FakeResourceLimits::default()),
            Box::new(FakeSmack::default()),
            Box::new(FakeSmackLabels),
            Box::new(FakeFreezer::new()),
            Box::new(FakeUserDb::new()),
            Box::new(FakeLauncher::new()),
        )
    } else {
        Supervisor::new(
            config.clone(),
            REBOOT_FAULT_RECORD_PATH.clone(),
            Box::new(SystemSandbox::new(opt.sandbox_root.clone())),
            Box::new(SystemResourceLimits),
            Box::new(SystemSmack),
            Box::new(SystemSmackLabels),
            Box::new(SystemFreezer::new(opt.freezer_root.clone())),
            Box::new(SystemUserDb),
            Box::new(SystemLauncher::new()),
        )
    };

    let app_names: Vec<String> = config
        .open("apps")
        .map(|apps| apps.children().map(|c| c.basename().to_string()).collect())
        .unwrap_or_default();

    for name in &app_names {
        let cfg_path = format!("apps/{}", name);
        match supervisor.construct_app(&cfg_path) {
            Ok(handle) => {
                if let Err(e) = supervisor.start_app(handle) {
                    log::error!(target: "app", "{}: failed to start: {}", name, e);
                }
            }
            Err(e) => log::error!(target: "app", "{}: failed to construct: {}", name, e),
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in &[SIGTERM, SIGINT] {
        signal_hook::flag::register(*sig, Arc::clone(&shutdown))
            .context("failed to register shutdown signal handler")?;
    }

    loop {
        if shutdown.load(Ordering::Relaxed) {
            log::info!(target: "sup", "shutdown requested, stopping all applications");
            let handles: Vec<_> = supervisor.apps_iter().map(|(h, _)| h).collect();
            for handle in handles {
                if let Err(e) = supervisor.stop_app(handle) {
                    log::warn!(target: "app", "stop during shutdown failed: {}", e);
                }
            }
            break;
        }

        for event in supervisor.tick() {
            if let SupervisorEvent::RebootRequested(handle) = event {
                let name = supervisor
                    .app(handle)
                    .map(|a| a.name().to_string())
                    .unwrap_or_default();
                log::error!(target: "app", "{}: reboot-class fault limit reached, rebooting system", name);
                if let Err(e) = Command::new("reboot").status() {
                    log::error!(target: "sup", "failed to invoke reboot: {}", e);
                }
            }
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    Ok(())
}

fn main() {
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        eprintln!("supervisord: {:#}", e);
        std::process::exit(1);
    }
}
