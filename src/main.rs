//! sshlirp CI daemon
//!
//! Entry point for the `sshlirp-ci` daemon. With no arguments it loads the
//! default config and detaches.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use sshlirp_ci::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use sshlirp_ci::daemon::{self, DaemonGuard};
use sshlirp_ci::logging::MainLog;
use sshlirp_ci::{CiConfig, CommandRunner, Orchestrator, ShutdownToken};
use sshlirp_ci_protocol::RuntimePaths;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sshlirp-ci")]
#[command(about = "Self-hosted CI daemon for sshlirp", version)]
struct Cli {
    /// Path to config file (default: $SSHLIRP_CI_CONFIG or /etc/sshlirp-ci/ci.conf)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Stay attached to the terminal instead of daemonizing
    #[arg(long)]
    foreground: bool,
}

fn main() {
    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let config_path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match CiConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let paths = RuntimePaths::from_env();
    match daemon::ensure_single_instance(&paths) {
        Ok(true) => eprintln!("Warning: removed stale PID file {}", paths.pid_path().display()),
        Ok(false) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    println!("Starting sshlirp CI daemon, logging to {}", config.log_file.display());

    if !cli.foreground {
        if let Err(e) = daemon::detach() {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let _guard = match DaemonGuard::acquire(paths.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            if cli.foreground {
                eprintln!("Error: {}", e);
            }
            return 1;
        }
    };

    if let Err(e) = daemon::prepare_layout(&config) {
        if cli.foreground {
            eprintln!("Error: {}", e);
        }
        return 1;
    }

    let main_log = match MainLog::open(&config.log_file) {
        Ok(log) => log,
        Err(e) => {
            if cli.foreground {
                eprintln!("Error: cannot open {}: {}", config.log_file.display(), e);
            }
            return 1;
        }
    };
    main_log.init_tracing();

    let shutdown = ShutdownToken::new();
    if let Err(e) = shutdown.install_handler() {
        error!(error = %e, "cannot install signal handler");
        return 1;
    }

    info!(
        pid = process::id(),
        archs = config.architectures.len(),
        poll_seconds = config.poll_interval.as_secs(),
        testing = config.testing_enabled(),
        "daemon started"
    );

    let runner = CommandRunner::scripts(&config.script_dir);
    let mut orchestrator = Orchestrator::new(config, runner, main_log, paths.state_file(), shutdown);
    let termination = orchestrator.run();

    info!(?termination, "daemon terminated");
    termination.exit_code()
}
