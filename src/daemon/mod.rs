//! Daemon lifecycle
//!
//! - Single-instance check against the PID file
//! - Detach from the controlling session (double fork)
//! - PID file written on start; PID and state files removed on exit
//! - Data layout (`MAIN_DIR`, versioning file, main log directory)

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use sshlirp_ci_protocol::{ProtocolError, RuntimePaths};
use thiserror::Error;
use tracing::warn;

use crate::config::CiConfig;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon already running with PID {0}")]
    AlreadyRunning(i32),

    #[error("cannot detach from session: {0}")]
    Detach(#[source] nix::Error),

    #[error("cannot change directory to /: {0}")]
    Chdir(#[source] io::Error),

    #[error("cannot write PID file: {0}")]
    PidFile(#[source] ProtocolError),

    #[error("cannot create {path}: {source}")]
    Layout {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type DaemonResult<T> = Result<T, DaemonError>;

/// Refuse to start if the PID file names a live process.
///
/// A stale PID file is removed. Returns true if one was found.
pub fn ensure_single_instance(paths: &RuntimePaths) -> DaemonResult<bool> {
    let pid_file = paths.pid_file();
    if !pid_file.exists() {
        return Ok(false);
    }
    if let Some(pid) = pid_file.live_pid() {
        return Err(DaemonError::AlreadyRunning(pid));
    }
    paths.remove_all();
    Ok(true)
}

/// Detach from the controlling terminal.
///
/// Must be called while the process is still single-threaded. Both parents
/// exit with status 0; only the grandchild returns.
#[cfg(unix)]
pub fn detach() -> DaemonResult<()> {
    use nix::unistd::{fork, setsid, ForkResult};

    // SAFETY: called before any thread is spawned, so the child inherits a
    // consistent single-threaded address space.
    match unsafe { fork() }.map_err(DaemonError::Detach)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(DaemonError::Detach)?;

    // SAFETY: still single-threaded, see above.
    match unsafe { fork() }.map_err(DaemonError::Detach)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    std::env::set_current_dir("/").map_err(DaemonError::Chdir)
}

/// Owns the runtime files for the daemon's lifetime
#[derive(Debug)]
pub struct DaemonGuard {
    paths: RuntimePaths,
}

impl DaemonGuard {
    /// Write this process's PID.
    pub fn acquire(paths: RuntimePaths) -> DaemonResult<Self> {
        paths
            .pid_file()
            .write(std::process::id())
            .map_err(DaemonError::PidFile)?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        for removed in self.paths.remove_all() {
            tracing::debug!(path = %removed.display(), "runtime file removed");
        }
    }
}

/// Create `MAIN_DIR`, an empty versioning file if missing, and the main log
/// directory.
pub fn prepare_layout(config: &CiConfig) -> DaemonResult<()> {
    create_dir(&config.main_dir)?;

    if let Some(parent) = config.versioning_file.parent() {
        create_dir(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.versioning_file)
        .map_err(|source| DaemonError::Layout {
            path: config.versioning_file.clone(),
            source,
        })?;

    if let Some(parent) = config.log_file.parent() {
        create_dir(parent)?;
    }
    Ok(())
}

fn create_dir(path: &Path) -> DaemonResult<()> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| {
        warn!(path = %path.display(), error = %source, "cannot create directory");
        DaemonError::Layout {
            path: path.to_path_buf(),
            source,
        }
    })
}
