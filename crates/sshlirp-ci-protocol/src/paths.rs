//! Runtime file locations

use std::path::{Path, PathBuf};

use crate::{PidFile, StateFile};

/// Directory holding the PID and state files unless overridden
pub const DEFAULT_RUNTIME_DIR: &str = "/var/run";

/// Environment variable overriding [`DEFAULT_RUNTIME_DIR`]
pub const RUNTIME_DIR_ENV: &str = "SSHLIRP_CI_RUNTIME_DIR";

/// PID file name
pub const PID_FILE_NAME: &str = "sshlirp_ci.pid";

/// State file name
pub const STATE_FILE_NAME: &str = "sshlirp_ci.state";

/// Locations of the daemon's runtime files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    dir: PathBuf,
}

impl RuntimePaths {
    /// Runtime files under the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve from `SSHLIRP_CI_RUNTIME_DIR`, falling back to `/var/run`
    pub fn from_env() -> Self {
        match std::env::var_os(RUNTIME_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(DEFAULT_RUNTIME_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pid_path(&self) -> PathBuf {
        self.dir.join(PID_FILE_NAME)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    pub fn pid_file(&self) -> PidFile {
        PidFile::new(self.pid_path())
    }

    pub fn state_file(&self) -> StateFile {
        StateFile::new(self.state_path())
    }

    /// Remove both runtime files, ignoring files that are already gone.
    ///
    /// Returns the paths that were actually removed.
    pub fn remove_all(&self) -> Vec<PathBuf> {
        [self.pid_path(), self.state_path()]
            .into_iter()
            .filter(|path| std::fs::remove_file(path).is_ok())
            .collect()
    }
}
