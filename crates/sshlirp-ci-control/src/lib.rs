//! Control tools for the sshlirp-ci daemon
//!
//! - `stop`: graceful. Waits until the daemon reports SLEEPING so no build
//!   round is interrupted, then sends SIGTERM.
//! - `kill`: forced. Sends SIGTERM immediately and escalates to SIGKILL if the
//!   daemon survives the grace period.
//!
//! Both tools remove stale PID and state files in every outcome where the
//! daemon is known to be gone.

use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sshlirp_ci_protocol::{process_alive, DaemonState, ProtocolError, RuntimePaths};

/// Errors from control operations
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("cannot read PID file: {0}")]
    PidFile(#[source] ProtocolError),

    #[error("daemon process {0} is not running")]
    NotRunning(i32),

    #[error("daemon process {0} exited on its own while waiting")]
    DiedWhileWaiting(i32),

    #[error("cannot read state file: {0}")]
    StateFile(#[source] ProtocolError),

    #[error("daemon did not enter SLEEPING state within {0:?}")]
    Timeout(Duration),

    #[error("failed to send {signal} to {pid}: {source}")]
    Signal {
        pid: i32,
        signal: Signal,
        #[source]
        source: nix::Error,
    },
}

impl ControlError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Timing for the graceful stop tool
#[derive(Debug, Clone, Copy)]
pub struct StopOptions {
    /// Maximum time to wait for SLEEPING state (default: 600s)
    pub max_wait: Duration,
    /// State file poll interval (default: 1s)
    pub poll_interval: Duration,
    /// Time given to the daemon to clean up its own files after SIGTERM (default: 3s)
    pub cleanup_wait: Duration,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            cleanup_wait: Duration::from_secs(3),
        }
    }
}

/// Timing for the forced kill tool
#[derive(Debug, Clone, Copy)]
pub struct KillOptions {
    /// Grace period after SIGTERM (default: 10s)
    pub term_wait: Duration,
    /// Wait after SIGKILL (default: 2s)
    pub kill_wait: Duration,
    /// Liveness poll interval (default: 200ms)
    pub check_interval: Duration,
}

impl Default for KillOptions {
    fn default() -> Self {
        Self {
            term_wait: Duration::from_secs(10),
            kill_wait: Duration::from_secs(2),
            check_interval: Duration::from_millis(200),
        }
    }
}

/// Result of a successful graceful stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub pid: i32,
    /// Runtime files the tool removed because the daemon had not
    pub leftover_files_removed: usize,
}

/// How the forced kill ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Exited within the SIGTERM grace period
    Terminated,
    /// Needed SIGKILL
    Killed,
    /// Still alive after SIGKILL; runtime files were removed anyway
    StillAlive,
}

/// Result of a forced kill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillReport {
    pub pid: i32,
    /// State observed before signalling, if readable
    pub observed_state: Option<DaemonState>,
    pub outcome: KillOutcome,
}

/// Stop the daemon gracefully.
pub fn stop(paths: &RuntimePaths, options: StopOptions) -> ControlResult<StopReport> {
    let pid = paths.pid_file().read().map_err(ControlError::PidFile)?;

    if !process_alive(pid) {
        return Err(ControlError::NotRunning(pid));
    }

    let state_file = paths.state_file();
    let start = Instant::now();
    let mut warned = false;

    loop {
        if !process_alive(pid) {
            paths.remove_all();
            return Err(ControlError::DiedWhileWaiting(pid));
        }

        match state_file.read() {
            Ok(DaemonState::Sleeping) => break,
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                if !warned {
                    eprintln!(
                        "Warning: state file {} not readable, daemon may be shutting down",
                        state_file.path().display()
                    );
                    warned = true;
                }
            }
            Err(e) => return Err(ControlError::StateFile(e)),
        }

        if start.elapsed() >= options.max_wait {
            return Err(ControlError::Timeout(options.max_wait));
        }
        thread::sleep(options.poll_interval);
    }

    send_signal(pid, Signal::SIGTERM)?;

    thread::sleep(options.cleanup_wait);
    let leftover_files_removed = paths.remove_all().len();

    Ok(StopReport {
        pid,
        leftover_files_removed,
    })
}

/// Terminate the daemon immediately, escalating to SIGKILL.
pub fn kill(paths: &RuntimePaths, options: KillOptions) -> ControlResult<KillReport> {
    let pid = match paths.pid_file().read() {
        Ok(pid) => pid,
        Err(e) => {
            paths.remove_all();
            return Err(ControlError::PidFile(e));
        }
    };

    if !process_alive(pid) {
        paths.remove_all();
        return Err(ControlError::NotRunning(pid));
    }

    let observed_state = paths.state_file().read().ok();

    let mut outcome = KillOutcome::StillAlive;
    match send_signal(pid, Signal::SIGTERM) {
        Ok(()) => {
            if wait_for_exit(pid, options.term_wait, options.check_interval) {
                outcome = KillOutcome::Terminated;
            }
        }
        Err(e) => eprintln!("Warning: {}", e),
    }

    if outcome == KillOutcome::StillAlive && process_alive(pid) {
        match send_signal(pid, Signal::SIGKILL) {
            Ok(()) => {
                if wait_for_exit(pid, options.kill_wait, options.check_interval) {
                    outcome = KillOutcome::Killed;
                }
            }
            Err(e) => eprintln!("Warning: {}", e),
        }
    } else if outcome == KillOutcome::StillAlive {
        // Exited between the grace period expiring and the liveness check
        outcome = KillOutcome::Terminated;
    }

    paths.remove_all();

    Ok(KillReport {
        pid,
        observed_state,
        outcome,
    })
}

fn send_signal(pid: i32, sig: Signal) -> ControlResult<()> {
    signal::kill(Pid::from_raw(pid), sig).map_err(|source| ControlError::Signal {
        pid,
        signal: sig,
        source,
    })
}

/// Poll until `pid` is gone. Returns true if it exited within `timeout`.
fn wait_for_exit(pid: i32, timeout: Duration, interval: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_alive(pid) {
            return true;
        }
        thread::sleep(interval);
    }
    !process_alive(pid)
}
