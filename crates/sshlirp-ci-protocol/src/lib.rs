//! Runtime files shared by the sshlirp-ci daemon and its control tools
//!
//! The daemon publishes two single-line files for external inspection:
//! - the PID file, naming the live daemon process
//! - the state file, containing exactly `WORKING` or `SLEEPING`
//!
//! The stop and kill tools only ever talk to the daemon through these files
//! and POSIX signals.

mod paths;
mod pid;
mod state;

pub use paths::{RuntimePaths, DEFAULT_RUNTIME_DIR, PID_FILE_NAME, RUNTIME_DIR_ENV, STATE_FILE_NAME};
pub use pid::{process_alive, PidFile};
pub use state::{DaemonState, StateFile};

use std::io;
use std::path::PathBuf;

/// Errors reading or writing runtime files
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed PID file {path}: {content:?}")]
    MalformedPid { path: PathBuf, content: String },

    #[error("unknown daemon state {0:?}")]
    UnknownState(String),
}

impl ProtocolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying cause is a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Result type for runtime file operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
