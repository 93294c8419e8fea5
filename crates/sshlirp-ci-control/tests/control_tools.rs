//! Stop and kill tools against real processes standing in for the daemon

use std::process::{Child, Command};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sshlirp_ci_control::{kill, stop, ControlError, KillOptions, KillOutcome, StopOptions};
use sshlirp_ci_protocol::{process_alive, DaemonState, RuntimePaths};
use tempfile::TempDir;

/// Spawn a fake daemon and reap it in the background so that its PID
/// disappears as soon as it exits.
fn spawn_fake_daemon(script: &str) -> (i32, JoinHandle<()>) {
    let mut child: Child = Command::new("/bin/sh").arg("-c").arg(script).spawn().unwrap();
    let pid = child.id() as i32;
    let reaper = thread::spawn(move || {
        let _ = child.wait();
    });
    // Give the shell time to install its traps
    thread::sleep(Duration::from_millis(200));
    (pid, reaper)
}

fn fast_stop() -> StopOptions {
    StopOptions {
        max_wait: Duration::from_secs(5),
        poll_interval: Duration::from_millis(50),
        cleanup_wait: Duration::from_millis(300),
    }
}

fn fast_kill() -> KillOptions {
    KillOptions {
        term_wait: Duration::from_millis(500),
        kill_wait: Duration::from_secs(2),
        check_interval: Duration::from_millis(20),
    }
}

#[test]
fn test_stop_sleeping_daemon() {
    let temp = TempDir::new().unwrap();
    let paths = RuntimePaths::new(temp.path());
    let (pid, reaper) = spawn_fake_daemon("sleep 30");

    paths.pid_file().write(pid as u32).unwrap();
    paths.state_file().write(DaemonState::Sleeping).unwrap();

    let report = stop(&paths, fast_stop()).unwrap();
    reaper.join().unwrap();

    assert_eq!(report.pid, pid);
    // The fake daemon never cleans up, so the tool must
    assert_eq!(report.leftover_files_removed, 2);
    assert!(!paths.pid_path().exists());
    assert!(!paths.state_path().exists());
    assert!(!process_alive(pid));
}

#[test]
fn test_stop_waits_for_sleeping_state() {
    let temp = TempDir::new().unwrap();
    let paths = RuntimePaths::new(temp.path());
    let (pid, reaper) = spawn_fake_daemon("sleep 30");

    paths.pid_file().write(pid as u32).unwrap();
    paths.state_file().write(DaemonState::Working).unwrap();

    let state_file = paths.state_file();
    let flipper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(400));
        state_file.write(DaemonState::Sleeping).unwrap();
    });

    let start = Instant::now();
    stop(&paths, fast_stop()).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(400));

    flipper.join().unwrap();
    reaper.join().unwrap();
    assert!(!process_alive(pid));
}

#[test]
fn test_stop_times_out_while_working() {
    let temp = TempDir::new().unwrap();
    let paths = RuntimePaths::new(temp.path());
    let (pid, reaper) = spawn_fake_daemon("sleep 30");

    paths.pid_file().write(pid as u32).unwrap();
    paths.state_file().write(DaemonState::Working).unwrap();

    let options = StopOptions {
        max_wait: Duration::from_millis(200),
        ..fast_stop()
    };
    let err = stop(&paths, options).unwrap_err();
    assert!(matches!(err, ControlError::Timeout(_)));
    // Still running, files untouched
    assert!(process_alive(pid));
    assert!(paths.pid_path().exists());

    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGKILL)
        .unwrap();
    reaper.join().unwrap();
}

#[test]
fn test_kill_terminates_with_sigterm() {
    let temp = TempDir::new().unwrap();
    let paths = RuntimePaths::new(temp.path());
    let (pid, reaper) = spawn_fake_daemon("sleep 30");

    paths.pid_file().write(pid as u32).unwrap();
    paths.state_file().write(DaemonState::Working).unwrap();

    let report = kill(&paths, fast_kill()).unwrap();
    reaper.join().unwrap();

    assert_eq!(report.outcome, KillOutcome::Terminated);
    assert_eq!(report.observed_state, Some(DaemonState::Working));
    assert!(!paths.pid_path().exists());
    assert!(!paths.state_path().exists());
}

#[test]
fn test_kill_escalates_when_sigterm_ignored() {
    let temp = TempDir::new().unwrap();
    let paths = RuntimePaths::new(temp.path());
    let (pid, reaper) =
        spawn_fake_daemon("trap '' TERM; while true; do sleep 0.1; done");

    paths.pid_file().write(pid as u32).unwrap();

    let report = kill(&paths, fast_kill()).unwrap();
    reaper.join().unwrap();

    assert_eq!(report.outcome, KillOutcome::Killed);
    assert!(report.observed_state.is_none());
    assert!(!process_alive(pid));
    assert!(!paths.pid_path().exists());
}

#[test]
fn test_kill_dead_daemon_cleans_files() {
    let temp = TempDir::new().unwrap();
    let paths = RuntimePaths::new(temp.path());
    let (pid, reaper) = spawn_fake_daemon("exit 0");
    reaper.join().unwrap();

    paths.pid_file().write(pid as u32).unwrap();
    paths.state_file().write(DaemonState::Sleeping).unwrap();

    let err = kill(&paths, fast_kill()).unwrap_err();
    assert!(matches!(err, ControlError::NotRunning(p) if p == pid));
    assert!(!paths.pid_path().exists());
    assert!(!paths.state_path().exists());
}
