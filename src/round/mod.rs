//! Round orchestrator (daemon main loop)
//!
//! Per round:
//! 1. Publish WORKING
//! 2. Round 0: prepare the host (fatal on error)
//! 3. Poll for commits, unless round 0 just cloned
//! 4. On a fresh clone or new commits: fan out one worker per architecture,
//!    join all, merge logs, publish binaries
//! 5. A poll error with no build is fatal
//! 6. Publish SLEEPING and sleep for the poll interval, waking early only on
//!    shutdown
//!
//! Round N+1 never starts before round N has finished publishing.

pub mod merge;
pub mod publish;
pub mod summary;

pub use publish::Publication;
pub use summary::{ArchitectureSummary, RoundSummary};

use std::thread;

use chrono::Utc;
use sshlirp_ci_protocol::{DaemonState, StateFile};
use tracing::{error, info, warn};

use crate::command::CommandRunner;
use crate::config::CiConfig;
use crate::host::HostPreparer;
use crate::logging::MainLog;
use crate::sandbox::{BootstrapLock, WorkerContext};
use crate::signal::{ShutdownToken, SleepOutcome};
use crate::version::{check_for_update, CheckOutcome, CommitCheck, UNSTABLE_LABEL};
use crate::worker::{run_worker, WorkerResult};

/// Why the daemon loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Shutdown was requested
    Shutdown,
    /// Host preparation failed on round 0
    PreparationFailed,
    /// Commit check failed
    PollFailed { round: u64 },
}

impl Termination {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Termination::Shutdown)
    }

    /// Process exit code for this termination
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }
}

/// What one round did
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: u64,
    /// Host preparation result (round 0 only)
    pub initial: Option<CommitCheck>,
    /// Commit check result, if a check ran
    pub poll: Option<CommitCheck>,
    /// Present when the round built
    pub build: Option<RoundSummary>,
}

/// Release label for a build: poll first, then the initial check, then
/// the unstable fallback.
pub fn release_label(poll: Option<&CommitCheck>, initial: Option<&CommitCheck>) -> String {
    poll.and_then(|c| c.release.clone())
        .or_else(|| initial.and_then(|c| c.release.clone()))
        .unwrap_or_else(|| UNSTABLE_LABEL.to_string())
}

/// Fan out one worker thread per context and join them all.
///
/// A worker that panics or cannot be spawned yields
/// [`WorkerResult::missing`].
pub fn run_workers(contexts: &[WorkerContext], runner: &CommandRunner) -> Vec<WorkerResult> {
    thread::scope(|scope| {
        let handles: Vec<_> = contexts
            .iter()
            .map(|ctx| {
                thread::Builder::new()
                    .name(format!("worker-{}", ctx.arch))
                    .spawn_scoped(scope, move || run_worker(ctx, runner))
            })
            .collect();

        handles
            .into_iter()
            .zip(contexts)
            .map(|(handle, ctx)| match handle {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    error!(arch = %ctx.arch, "worker panicked");
                    WorkerResult::missing()
                }),
                Err(e) => {
                    error!(arch = %ctx.arch, error = %e, "cannot spawn worker");
                    WorkerResult::missing()
                }
            })
            .collect()
    })
}

/// Drives the poll-build-sleep loop
pub struct Orchestrator {
    config: CiConfig,
    runner: CommandRunner,
    main_log: MainLog,
    state_file: StateFile,
    shutdown: ShutdownToken,
    bootstrap_lock: BootstrapLock,
    round: u64,
    initial: Option<CommitCheck>,
}

impl Orchestrator {
    pub fn new(
        config: CiConfig,
        runner: CommandRunner,
        main_log: MainLog,
        state_file: StateFile,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            config,
            runner,
            main_log,
            state_file,
            shutdown,
            bootstrap_lock: BootstrapLock::new(),
            round: 0,
            initial: None,
        }
    }

    /// Next round to run
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Run until shutdown or a fatal error.
    pub fn run(&mut self) -> Termination {
        loop {
            if self.shutdown.is_requested() {
                info!(round = self.round, "shutdown requested, exiting");
                return Termination::Shutdown;
            }

            if let Err(termination) = self.run_round() {
                return termination;
            }

            if self.shutdown.is_requested() {
                info!(round = self.round, "shutdown requested, exiting");
                return Termination::Shutdown;
            }

            self.publish_state(DaemonState::Sleeping);
            let interval = self.config.poll_interval;
            info!(seconds = interval.as_secs(), "daemon sleeping");

            if let SleepOutcome::Interrupted { remaining } = self.shutdown.sleep(interval) {
                info!(
                    remaining_seconds = remaining.as_secs(),
                    "sleep interrupted by shutdown, exiting"
                );
                return Termination::Shutdown;
            }
        }
    }

    /// Run one round and advance the round counter.
    pub fn run_round(&mut self) -> Result<RoundReport, Termination> {
        let round = self.round;
        self.publish_state(DaemonState::Working);
        info!(round, "round started");

        if round == 0 {
            let check = HostPreparer::new(&self.config, &self.runner).prepare();
            if check.is_error() {
                error!("host preparation failed, exiting daemon");
                return Err(Termination::PreparationFailed);
            }
            self.initial = Some(check);
        }
        let initial_updated = round == 0
            && self
                .initial
                .as_ref()
                .is_some_and(|c| c.outcome == CheckOutcome::Updated);

        let poll = if round > 0 || !initial_updated {
            Some(check_for_update(
                &self.runner,
                &self.config,
                &self.config.log_file,
            ))
        } else {
            None
        };

        let triggered = initial_updated || poll.as_ref().is_some_and(CommitCheck::is_updated);

        let build = if triggered {
            let release = release_label(poll.as_ref(), self.initial.as_ref());
            Some(self.build(round, &release))
        } else {
            if poll.as_ref().is_some_and(CommitCheck::is_error) {
                error!(round, "commit check failed, exiting daemon");
                return Err(Termination::PollFailed { round });
            }
            info!(round, "nothing to build");
            None
        };

        self.round += 1;
        Ok(RoundReport {
            round,
            initial: if round == 0 { self.initial.clone() } else { None },
            poll,
            build,
        })
    }

    fn build(&self, round: u64, release: &str) -> RoundSummary {
        let mut summary = RoundSummary::new(round, release, Utc::now());
        info!(round, %release, archs = self.config.architectures.len(), "build round started");

        let contexts: Vec<WorkerContext> = self
            .config
            .architectures
            .iter()
            .map(|arch| WorkerContext::new(&self.config, arch, round, self.bootstrap_lock.clone()))
            .collect();

        let results = run_workers(&contexts, &self.runner);

        for ctx in &contexts {
            if let Err(e) = merge::merge_logs(
                &self.main_log,
                &ctx.arch,
                &ctx.host_log,
                &ctx.sandbox_log_on_host(),
            ) {
                warn!(arch = %ctx.arch, error = %e, "log merge skipped");
            }
        }

        let dest_dir = publish::release_dir(&self.config.target_dir, release);
        for (ctx, result) in contexts.iter().zip(&results) {
            match result.error {
                Some(ref message) => warn!(arch = %ctx.arch, error = %message, "build failed"),
                None if !result.is_success() => {
                    warn!(arch = %ctx.arch, "build failed without a result")
                }
                None => {}
            }
            let publication = publish::publish_binary(&ctx.arch, &ctx.binary_on_host(), &dest_dir);
            summary.architectures.push(ArchitectureSummary::new(
                ctx.arch.as_str(),
                result,
                &publication,
            ));
        }

        summary.finished_at = Utc::now();
        let path = self.config.round_summary_path();
        if let Err(e) = summary.write_to_file(&path) {
            warn!(path = %path.display(), error = %e, "cannot write round summary");
        }
        info!(
            round,
            %release,
            succeeded = summary.succeeded(),
            total = summary.architectures.len(),
            "build round finished"
        );
        summary
    }

    fn publish_state(&self, state: DaemonState) {
        if let Err(e) = self.state_file.write(state) {
            warn!(%state, error = %e, "cannot write state file");
        }
    }
}
