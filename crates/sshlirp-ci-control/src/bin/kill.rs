//! sshlirp-ci-kill
//!
//! Usage: sshlirp-ci-kill
//!
//! Terminates the daemon immediately: SIGTERM, then SIGKILL if it survives
//! the grace period. Stale runtime files are always removed.

use std::process::ExitCode;

use sshlirp_ci_control::{kill, KillOptions, KillOutcome};
use sshlirp_ci_protocol::RuntimePaths;

fn main() -> ExitCode {
    let paths = RuntimePaths::from_env();

    match kill(&paths, KillOptions::default()) {
        Ok(report) => {
            let state = report
                .observed_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            println!("Killed sshlirp-ci daemon (PID {}), state was {}.", report.pid, state);
            match report.outcome {
                KillOutcome::Terminated => println!("Daemon exited after SIGTERM."),
                KillOutcome::Killed => println!("Daemon killed with SIGKILL."),
                KillOutcome::StillAlive => {
                    eprintln!("Warning: process {} still appears alive after SIGKILL.", report.pid)
                }
            }
            println!("Runtime files removed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
