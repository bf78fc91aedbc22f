//! End-to-end scenarios exercised through `Supervisor`'s public API only,
//! with every collaborator faked (no real filesystem, SMACK, or cgroup
//! access). Process exits are driven via `SharedFakeLauncher::finish`.

use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use supervisor_core::collab::fake::{
    FakeResourceLimits, FakeSandbox, FakeSmack, FakeSmackLabels, FakeUserDb, SharedFakeFreezer,
    SharedFakeLauncher,
};
use supervisor_core::config::ConfigTree;
use supervisor_core::{AppState, Supervisor, SupervisorEvent};

fn supervisor(
    cfg: &str,
    ledger_path: PathBuf,
    launcher: SharedFakeLauncher,
    freezer: SharedFakeFreezer,
) -> Supervisor {
    let config = ConfigTree::parse(cfg).unwrap();
    Supervisor::new(
        config,
        ledger_path,
        Box::new(FakeSandbox::new(PathBuf::from("/sandbox"))),
        Box::new(FakeResourceLimits::default()),
        Box::new(FakeSmack::default()),
        Box::new(FakeSmackLabels),
        Box::new(freezer),
        Box::new(FakeUserDb::new()),
        Box::new(launcher),
    )
}

fn ledger_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("supervisor_scenarios_{}_{}", tag, std::process::id()))
}

fn pid_of(supervisor: &Supervisor, handle: supervisor_core::AppHandle) -> Pid {
    supervisor.app(handle).unwrap().processes()[0].pid.unwrap()
}

#[test]
fn happy_start_then_graceful_stop() {
    let cfg = r#"
        [apps.a]
        sandboxed = false

        [apps.a.procs.p]
        exe = "/bin/p"
    "#;
    let launcher = SharedFakeLauncher::new();
    let freezer = SharedFakeFreezer::new();
    let path = ledger_path("happy");
    let mut sup = supervisor(cfg, path.clone(), launcher, freezer.clone());

    let handle = sup.construct_app("apps/a").unwrap();
    sup.start_app(handle).unwrap();
    assert_eq!(sup.app(handle).unwrap().state(), AppState::Running);

    sup.stop_app(handle).unwrap();
    // FakeFreezer never empties on its own (nothing untracks on SIGTERM), so
    // stop() arms the hard-kill timer rather than completing immediately.
    assert_eq!(sup.app(handle).unwrap().state(), AppState::Running);
    assert_eq!(freezer.signals_sent_to("a"), vec![Signal::SIGTERM]);

    // After the 300ms soft-kill grace period elapses, the next tick escalates
    // to a hard kill (spec 4.1.2's exactly-once SIGTERM-then-SIGKILL sequence).
    sleep(Duration::from_millis(320));
    sup.tick();
    assert_eq!(sup.app(handle).unwrap().state(), AppState::Running);
    assert_eq!(freezer.signals_sent_to("a"), vec![Signal::SIGTERM, Signal::SIGKILL]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn restart_fault_within_window_downgrades_to_stop_app() {
    let cfg = r#"
        [apps.a]
        sandboxed = false

        [apps.a.procs.p]
        exe = "/bin/p"
        onFault = "restart"
    "#;
    let launcher = SharedFakeLauncher::new();
    let path = ledger_path("restart_window");
    let mut sup = supervisor(cfg, path.clone(), launcher.clone(), SharedFakeFreezer::new());

    let handle = sup.construct_app("apps/a").unwrap();
    sup.start_app(handle).unwrap();

    let first_pid = pid_of(&sup, handle);
    launcher.finish(first_pid, WaitStatus::Exited(first_pid, 1));
    sup.tick();
    // Restarted once, still running.
    assert_eq!(sup.app(handle).unwrap().state(), AppState::Running);
    let second_pid = pid_of(&sup, handle);
    assert_ne!(first_pid, second_pid);

    // Second fault for the same proc inside the 10s window downgrades to
    // StopApp (spec 4.1.5).
    launcher.finish(second_pid, WaitStatus::Exited(second_pid, 1));
    sup.tick();
    assert_eq!(sup.app(handle).unwrap().state(), AppState::Stopped);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn reboot_fault_persists_across_restart_via_ledger() {
    let cfg = r#"
        [apps.a]
        sandboxed = false

        [apps.a.procs.p]
        exe = "/bin/p"
        onFault = "reboot"
    "#;
    let path = ledger_path("reboot");
    let _ = std::fs::remove_file(&path);

    // First supervisor instance: a reboot-class fault is surfaced and the
    // ledger is written before the event is returned.
    {
        let launcher = SharedFakeLauncher::new();
        let mut sup = supervisor(cfg, path.clone(), launcher.clone(), SharedFakeFreezer::new());
        let handle = sup.construct_app("apps/a").unwrap();
        sup.start_app(handle).unwrap();
        let pid = pid_of(&sup, handle);
        launcher.finish(pid, WaitStatus::Exited(pid, 1));
        let events = sup.tick();
        assert_eq!(events, vec![SupervisorEvent::RebootRequested(handle)]);
        assert!(std::fs::read_to_string(&path).unwrap().contains("a/p"));
    }

    // A fresh supervisor (simulating post-reboot restart) sees the ledger
    // already naming this (app, proc) pair, so a second reboot-class fault
    // downgrades to StopApp instead of requesting another reboot.
    {
        let launcher = SharedFakeLauncher::new();
        let mut sup = supervisor(cfg, path.clone(), launcher.clone(), SharedFakeFreezer::new());
        let handle = sup.construct_app("apps/a").unwrap();
        sup.start_app(handle).unwrap();
        let pid = pid_of(&sup, handle);
        launcher.finish(pid, WaitStatus::Exited(pid, 1));
        let events = sup.tick();
        assert!(events.is_empty());
        assert_eq!(sup.app(handle).unwrap().state(), AppState::Stopped);
    }

    let _ = std::fs::remove_file(&path);
}

#[test]
fn watchdog_restart_relaunches_the_process() {
    let cfg = r#"
        [apps.a]
        sandboxed = false

        [apps.a.procs.p]
        exe = "/bin/p"
        watchdogAction = "restart"
    "#;
    let launcher = SharedFakeLauncher::new();
    let path = ledger_path("watchdog");
    let mut sup = supervisor(cfg, path.clone(), launcher.clone(), SharedFakeFreezer::new());

    let handle = sup.construct_app("apps/a").unwrap();
    sup.start_app(handle).unwrap();
    let pid = pid_of(&sup, handle);

    let event = sup.dispatch_watchdog(pid);
    assert_eq!(event, SupervisorEvent::None);
    assert!(sup.app(handle).unwrap().processes()[0].stop_handler.is_some());

    // The watchdog path kills with SIGKILL; simulate the reap of that kill.
    launcher.finish(pid, WaitStatus::Signaled(pid, nix::sys::signal::Signal::SIGKILL, false));
    sup.tick();

    assert_eq!(sup.app(handle).unwrap().state(), AppState::Running);
    let new_pid = pid_of(&sup, handle);
    assert_ne!(pid, new_pid);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn multiple_apps_construct_and_start_independently() {
    let cfg = r#"
        [apps.a]
        sandboxed = false
        [apps.a.procs.p]
        exe = "/bin/a"

        [apps.b]
        sandboxed = false
        [apps.b.procs.p]
        exe = "/bin/b"
    "#;
    let launcher = SharedFakeLauncher::new();
    let path = ledger_path("multi_app");
    let mut sup = supervisor(cfg, path.clone(), launcher, SharedFakeFreezer::new());

    let a = sup.construct_app("apps/a").unwrap();
    let b = sup.construct_app("apps/b").unwrap();
    sup.start_app(a).unwrap();
    sup.start_app(b).unwrap();

    assert_eq!(sup.app(a).unwrap().state(), AppState::Running);
    assert_eq!(sup.app(b).unwrap().state(), AppState::Running);
    assert_eq!(sup.find_app_by_name("b"), Some(b));

    let status = sup.status();
    assert_eq!(status.apps.len(), 2);

    let _ = std::fs::remove_file(&path);
}
