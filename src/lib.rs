//! sshlirp CI - self-hosted build daemon
//!
//! Polls the sshlirp and libslirp repositories and, on every new commit,
//! builds sshlirp for each configured architecture inside its own chroot
//! sandbox, publishing the binaries under `<TARGET_DIR>/<release>/`.

pub mod command;
pub mod config;
pub mod daemon;
pub mod host;
pub mod logging;
pub mod mock;
pub mod round;
pub mod sandbox;
pub mod signal;
pub mod version;
pub mod worker;

pub use command::{CommandExecutor, CommandId, CommandOutcome, CommandRunner, ScriptExecutor};
pub use config::{Architecture, CiConfig, ConfigError};
pub use round::{Orchestrator, RoundReport, Termination};
pub use signal::ShutdownToken;
pub use version::{CheckOutcome, CommitCheck};
pub use worker::{WorkerOutcome, WorkerResult};
