//! Sandbox lifecycle
//!
//! Each architecture builds inside its own directory tree at
//! `<MAIN_DIR>/<arch>-chroot`. Four sequential operations:
//!
//! 1. `bootstrap`: create the root and populate it (round 0 only, under the
//!    shared [`BootstrapLock`])
//! 2. `ensure_working_dirs`: sandbox-relative directories and log (round 0 only)
//! 3. `stage_sources`: copy host sources in (every build round)
//! 4. `teardown_sources`: remove staged copies (after every build attempt)
//!
//! Every other path a worker touches belongs to its architecture alone, so
//! only bootstrap is serialized.

mod context;

pub use context::{host_log_path, sandbox_path, sandbox_root, BootstrapLock, WorkerContext};

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::command::{CommandId, CommandOutcome, CommandRunner};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("cannot create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} failed")]
    Command(CommandId),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

/// Sandbox operations for one worker context
#[derive(Debug)]
pub struct Sandbox<'a> {
    ctx: &'a WorkerContext,
    runner: &'a CommandRunner,
}

impl<'a> Sandbox<'a> {
    pub fn new(ctx: &'a WorkerContext, runner: &'a CommandRunner) -> Self {
        Self { ctx, runner }
    }

    /// Create and populate the sandbox root.
    pub fn bootstrap(&self) -> SandboxResult<()> {
        create_dir(&self.ctx.sandbox_root)?;

        let args = crate::command_args![
            self.ctx.arch.as_str(),
            &self.ctx.sandbox_root,
            &self.ctx.host_log,
        ];

        let _guard = self.ctx.bootstrap_lock.hold();
        debug!(arch = %self.ctx.arch, "bootstrap lock acquired");
        self.run(CommandId::Bootstrap, &args)
    }

    /// Create the sandbox-relative directory layout and touch the sandbox log.
    pub fn ensure_working_dirs(&self) -> SandboxResult<()> {
        let ctx = self.ctx;
        let mut dirs = vec![
            ctx.sandbox_main_dir.clone(),
            ctx.sandbox_sshlirp_dir.clone(),
            ctx.sandbox_libslirp_dir.clone(),
            ctx.sandbox_target_dir.join("bin"),
        ];
        if let Some(parent) = ctx.sandbox_log.parent() {
            dirs.push(parent.to_path_buf());
        }
        if let Some(ref harness) = ctx.sandbox_harness_dir {
            dirs.push(harness.clone());
        }

        for dir in dirs {
            create_dir(&ctx.in_sandbox(&dir))?;
        }

        let log = ctx.sandbox_log_on_host();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map(drop)
            .map_err(|source| SandboxError::Io { path: log, source })
    }

    /// Copy host sources into the sandbox. When testing is enabled the
    /// harness is copied too and its staged copy patched; host sources are
    /// never written.
    pub fn stage_sources(&self) -> SandboxResult<()> {
        let ctx = self.ctx;
        self.copy_in(&ctx.host_sshlirp_dir, &ctx.sandbox_sshlirp_dir)?;
        self.copy_in(&ctx.host_libslirp_dir, &ctx.sandbox_libslirp_dir)?;

        if let (Some(patch), Some(host), Some(sandbox)) = (
            ctx.harness_patch_file.as_ref(),
            ctx.host_harness_dir.as_ref(),
            ctx.sandbox_harness_dir.as_ref(),
        ) {
            self.copy_in(host, sandbox)?;
            self.run(
                CommandId::PatchHarness,
                &crate::command_args![patch, &ctx.host_log],
            )?;
        }
        Ok(())
    }

    /// Remove the staged sshlirp and libslirp copies.
    pub fn teardown_sources(&self) -> SandboxResult<()> {
        let ctx = self.ctx;
        let args = crate::command_args![
            &ctx.sandbox_root,
            &ctx.sandbox_sshlirp_dir,
            &ctx.sandbox_libslirp_dir,
            &ctx.host_log,
        ];
        self.run(CommandId::RemoveSources, &args)
    }

    fn copy_in(&self, host_dir: &Path, sandbox_dir: &Path) -> SandboxResult<()> {
        let args = crate::command_args![
            host_dir,
            &self.ctx.sandbox_root,
            sandbox_dir,
            &self.ctx.host_log,
        ];
        self.run(CommandId::CopySources, &args)
    }

    fn run(&self, command: CommandId, args: &[OsString]) -> SandboxResult<()> {
        match self.runner.run(command, args, &self.ctx.host_log) {
            CommandOutcome::Error => Err(SandboxError::Command(command)),
            _ => Ok(()),
        }
    }
}

fn create_dir(path: &Path) -> SandboxResult<()> {
    fs::create_dir_all(path).map_err(|source| SandboxError::Io {
        path: path.to_path_buf(),
        source,
    })
}
