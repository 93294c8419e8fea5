//! Build worker pipeline
//!
//! One worker per architecture per build round:
//!
//! ```text
//! Start -> [bootstrap -> working dirs] -> stage sources -> compile -> [test]
//!       -> remove sources -> Done | Failed
//! ```
//!
//! Bootstrap and working dirs run on round 0 only. Test runs only when testing
//! is enabled, and its failure is recorded without failing the worker. Any
//! other failure skips straight to `remove sources`, which always runs.

mod progress;

pub use progress::{Stage, StageRecord, StageStatus, WorkerOutcome, WorkerResult};

use std::fs::File;
use std::io::Write;

use tracing::{info, warn};

use crate::command::{open_append, CommandId, CommandOutcome, CommandRunner};
use crate::sandbox::{Sandbox, WorkerContext};

/// Run the full pipeline for one architecture.
pub fn run_worker(ctx: &WorkerContext, runner: &CommandRunner) -> WorkerResult {
    let mut result = WorkerResult::new(expected_stages(ctx));

    let log = match open_append(&ctx.host_log) {
        Ok(file) => file,
        Err(e) => {
            warn!(arch = %ctx.arch, error = %e, "cannot open worker log");
            result.fail(e.to_string());
            return result;
        }
    };
    let mut worker = Worker {
        ctx,
        runner,
        sandbox: Sandbox::new(ctx, runner),
        log,
        result,
    };

    worker.line(format_args!("round {}: build started", ctx.round));

    if let Err(message) = worker.build() {
        worker.result.fail(message);
    }

    match worker.sandbox.teardown_sources() {
        Ok(()) => worker.record(Stage::RemoveSources, StageStatus::Done),
        Err(e) => {
            worker.record(Stage::RemoveSources, StageStatus::Failed);
            if worker.result.outcome == WorkerOutcome::Success {
                worker.result.fail(e.to_string());
            }
        }
    }

    // stage lines were written as each stage resolved
    let progress = worker.result.progress_line();
    worker.line(format_args!("{}", progress));

    let result = worker.result;
    info!(
        arch = %ctx.arch,
        round = ctx.round,
        outcome = ?result.outcome,
        progress = result.progress_percent(),
        "worker finished"
    );
    result
}

/// 5 stages, or 6 with testing
pub fn expected_stages(ctx: &WorkerContext) -> usize {
    if ctx.testing_enabled() {
        6
    } else {
        5
    }
}

struct Worker<'a> {
    ctx: &'a WorkerContext,
    runner: &'a CommandRunner,
    sandbox: Sandbox<'a>,
    log: File,
    result: WorkerResult,
}

impl Worker<'_> {
    /// Every stage up to and including test. Returns the failure message of
    /// the first hard failure.
    fn build(&mut self) -> Result<(), String> {
        if self.ctx.round == 0 {
            let bootstrapped = self.sandbox.bootstrap();
            self.check(Stage::Bootstrap, bootstrapped)?;
            let dirs = self.sandbox.ensure_working_dirs();
            self.check(Stage::WorkingDirs, dirs)?;
        } else {
            self.record(Stage::Bootstrap, StageStatus::Skipped);
            self.record(Stage::WorkingDirs, StageStatus::Skipped);
        }

        let staged = self.sandbox.stage_sources();
        self.check(Stage::StageSources, staged)?;

        if self.compile().is_error() {
            self.record(Stage::Compile, StageStatus::Failed);
            return Err(format!("{} failed for {}", Stage::Compile, self.ctx.arch));
        }
        self.record(Stage::Compile, StageStatus::Done);

        if self.ctx.testing_enabled() {
            let status = match self.test() {
                CommandOutcome::Error => StageStatus::Failed,
                _ => StageStatus::Done,
            };
            self.record(Stage::Test, status);
        }
        Ok(())
    }

    fn compile(&self) -> CommandOutcome {
        let ctx = self.ctx;
        let args = crate::command_args![
            &ctx.sandbox_root,
            &ctx.sandbox_sshlirp_dir,
            &ctx.sandbox_libslirp_dir,
            &ctx.sandbox_target_dir,
            ctx.arch.as_str(),
            &ctx.sandbox_log,
        ];
        self.runner
            .run(CommandId::Compile, &args, &ctx.sandbox_log_on_host())
    }

    fn test(&self) -> CommandOutcome {
        let ctx = self.ctx;
        let Some(ref harness) = ctx.sandbox_harness_dir else {
            return CommandOutcome::Success;
        };
        let args = crate::command_args![
            ctx.sandbox_binary(),
            &ctx.sandbox_root,
            harness,
            &ctx.host_log,
            &ctx.sandbox_log,
        ];
        self.runner.run(CommandId::Test, &args, &ctx.host_log)
    }

    fn check<E: std::fmt::Display>(&mut self, stage: Stage, res: Result<(), E>) -> Result<(), String> {
        match res {
            Ok(()) => {
                self.record(stage, StageStatus::Done);
                Ok(())
            }
            Err(e) => {
                self.record(stage, StageStatus::Failed);
                Err(format!("{}: {}", stage, e))
            }
        }
    }

    fn record(&mut self, stage: Stage, status: StageStatus) {
        let record = StageRecord { stage, status };
        self.line(format_args!("{}", record));
        self.result.progress.push(record);
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.log, "[{}] {}", self.ctx.arch, args) {
            warn!(arch = %self.ctx.arch, error = %e, "cannot write worker log");
        }
    }
}
