//! Host environment preparation
//!
//! Runs once, on the daemon's first round: creates the host-side directory
//! layout and clones every tracked repository that is not cloned yet.

use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::command::{CommandId, CommandOutcome, CommandRunner};
use crate::config::{CiConfig, Repository};
use crate::version::{read_latest_release, CheckOutcome, CommitCheck};

/// One-shot, idempotent host setup
#[derive(Debug)]
pub struct HostPreparer<'a> {
    config: &'a CiConfig,
    runner: &'a CommandRunner,
}

impl<'a> HostPreparer<'a> {
    pub fn new(config: &'a CiConfig, runner: &'a CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Ensure directories and clones exist.
    ///
    /// Returns `Updated` if anything was cloned, `Unchanged` if every clone
    /// was already present, and `Error` on the first failure. Both non-error
    /// outcomes carry the current release label.
    pub fn prepare(&self) -> CommitCheck {
        let repositories = self.config.repositories();

        let mut dirs: Vec<&Path> = vec![&self.config.target_dir];
        dirs.extend(repositories.iter().map(|r| r.source_dir.as_path()));
        dirs.push(&self.config.thread_log_dir);

        for dir in dirs {
            if let Err(e) = ensure_dir(dir) {
                error!(dir = %dir.display(), error = %e, "cannot create host directory");
                return CommitCheck::error();
            }
        }

        let mut cloned = false;
        for repo in &repositories {
            match self.clone_repository(repo) {
                CommandOutcome::Success => {
                    info!(repo = repo.name, "repository cloned");
                    cloned = true;
                }
                CommandOutcome::NoOp => {
                    info!(repo = repo.name, "repository already cloned");
                }
                CommandOutcome::Error => {
                    error!(repo = repo.name, url = %repo.url, "clone failed");
                    return CommitCheck::error();
                }
            }
        }

        let release = match read_latest_release(&self.config.versioning_file) {
            Ok(release) => release,
            Err(e) => {
                error!(error = %e, "cannot read release label");
                return CommitCheck::error();
            }
        };

        CommitCheck {
            outcome: if cloned {
                CheckOutcome::Updated
            } else {
                CheckOutcome::Unchanged
            },
            release: Some(release),
        }
    }

    fn clone_repository(&self, repo: &Repository) -> CommandOutcome {
        let log = &self.config.log_file;
        let args = crate::command_args![
            &repo.url,
            &repo.source_dir,
            log,
            &self.config.versioning_file,
        ];
        self.runner.run(CommandId::Clone, &args, log)
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}
