//! Release label tracking
//!
//! The versioning file is append-only, one release tag per line. The clone
//! and poll scripts append to it; the daemon only reads the last non-empty
//! line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::command::{CommandId, CommandOutcome, CommandRunner};
use crate::config::CiConfig;

/// Label used when no release has been tagged yet
pub const UNSTABLE_LABEL: &str = "unstable";

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("cannot read versioning file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a commit check or initial preparation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Unchanged,
    Updated,
    Error,
}

/// Result of polling for new commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCheck {
    pub outcome: CheckOutcome,
    /// Present on `Updated`, never on `Error`
    pub release: Option<String>,
}

impl CommitCheck {
    pub fn unchanged() -> Self {
        Self {
            outcome: CheckOutcome::Unchanged,
            release: None,
        }
    }

    pub fn updated(release: impl Into<String>) -> Self {
        Self {
            outcome: CheckOutcome::Updated,
            release: Some(release.into()),
        }
    }

    pub fn error() -> Self {
        Self {
            outcome: CheckOutcome::Error,
            release: None,
        }
    }

    pub fn is_updated(&self) -> bool {
        self.outcome == CheckOutcome::Updated
    }

    pub fn is_error(&self) -> bool {
        self.outcome == CheckOutcome::Error
    }
}

/// Last non-empty line of the versioning file, or [`UNSTABLE_LABEL`].
pub fn read_latest_release(path: &Path) -> Result<String, VersionError> {
    let content = fs::read_to_string(path).map_err(|source| VersionError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or(UNSTABLE_LABEL)
        .to_string())
}

/// Poll the tracked repositories for new commits.
///
/// `log` receives the poll script's output.
pub fn check_for_update(runner: &CommandRunner, config: &CiConfig, log: &Path) -> CommitCheck {
    let args = crate::command_args![
        &config.sshlirp_source_dir,
        &config.sshlirp_repo_url,
        &config.libslirp_source_dir,
        &config.libslirp_repo_url,
        log,
        &config.versioning_file,
    ];

    match runner.run(CommandId::CheckCommit, &args, log) {
        CommandOutcome::NoOp => {
            info!("no new commits");
            CommitCheck::unchanged()
        }
        CommandOutcome::Success => match read_latest_release(&config.versioning_file) {
            Ok(release) => {
                info!(%release, "new commits fetched");
                CommitCheck::updated(release)
            }
            Err(e) => {
                error!(error = %e, "cannot determine release after update");
                CommitCheck::error()
            }
        },
        CommandOutcome::Error => {
            error!("commit check failed");
            CommitCheck::error()
        }
    }
}
