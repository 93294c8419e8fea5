//! sshlirp-ci-stop
//!
//! Usage: sshlirp-ci-stop
//!
//! Waits for the daemon to enter SLEEPING, then terminates it with SIGTERM.

use std::process::ExitCode;

use sshlirp_ci_control::{stop, StopOptions};
use sshlirp_ci_protocol::RuntimePaths;

fn main() -> ExitCode {
    let paths = RuntimePaths::from_env();
    let options = StopOptions::default();

    println!(
        "Stopping sshlirp-ci; this may wait up to {} seconds for the daemon to enter SLEEPING state...",
        options.max_wait.as_secs()
    );

    match stop(&paths, options) {
        Ok(report) => {
            if report.leftover_files_removed > 0 {
                println!(
                    "Daemon did not clean up its runtime files, removed {} file(s).",
                    report.leftover_files_removed
                );
            }
            println!("sshlirp-ci daemon (PID {}) terminated.", report.pid);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
