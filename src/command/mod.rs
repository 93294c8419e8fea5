//! External command runner
//!
//! Every git, sandbox, build, and test action is an external script with a
//! fixed argument list. The runner checks the argument count, executes the
//! script through a [`CommandExecutor`], and classifies the exit status by
//! call shape:
//!
//! - repository shape (clone/poll): 0 = no-op, 2 = changed, anything else = error
//! - pipeline shape (sandbox/build/test): 0 = success, anything else = error
//!
//! Abnormal termination is always an error. The runner never retries.

use std::ffi::OsString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

/// Shell used to run command scripts
pub const SHELL: &str = "/bin/sh";

/// Identity of an external command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    Clone,
    CheckCommit,
    Bootstrap,
    CopySources,
    PatchHarness,
    Compile,
    Test,
    RemoveSources,
}

/// How a command's exit status is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Repository,
    Pipeline,
}

impl CommandId {
    pub const ALL: [CommandId; 8] = [
        CommandId::Clone,
        CommandId::CheckCommit,
        CommandId::Bootstrap,
        CommandId::CopySources,
        CommandId::PatchHarness,
        CommandId::Compile,
        CommandId::Test,
        CommandId::RemoveSources,
    ];

    /// Script file name inside the script directory
    pub fn script_name(&self) -> &'static str {
        match self {
            CommandId::Clone => "gitClone.sh",
            CommandId::CheckCommit => "checkCommit.sh",
            CommandId::Bootstrap => "chrootSetup.sh",
            CommandId::CopySources => "copySource.sh",
            CommandId::PatchHarness => "modifyVdens.sh",
            CommandId::Compile => "compile.sh",
            CommandId::Test => "test.sh",
            CommandId::RemoveSources => "removeSourceCopy.sh",
        }
    }

    /// Exact number of arguments the command takes
    pub fn arity(&self) -> usize {
        match self {
            CommandId::Clone => 4,
            CommandId::CheckCommit => 6,
            CommandId::Bootstrap => 3,
            CommandId::CopySources => 4,
            CommandId::PatchHarness => 2,
            CommandId::Compile => 6,
            CommandId::Test => 5,
            CommandId::RemoveSources => 4,
        }
    }

    pub fn shape(&self) -> CallShape {
        match self {
            CommandId::Clone | CommandId::CheckCommit => CallShape::Repository,
            _ => CallShape::Pipeline,
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

/// Classified result of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// Nothing changed (repository shape only)
    NoOp,
    Error,
}

impl CommandOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandOutcome::Error)
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    /// Killed by a signal or otherwise ended without an exit code
    Abnormal,
}

/// Command execution errors
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{command} takes {expected} arguments, got {got}")]
    WrongArity {
        command: CommandId,
        expected: usize,
        got: usize,
    },

    #[error("cannot open log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type for command execution
pub type CommandResult<T> = Result<T, CommandError>;

/// Runs one external command, appending its output to `log`
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: CommandId, args: &[OsString], log: &Path)
        -> CommandResult<ExitKind>;
}

/// Executes the real command scripts from a script directory
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    script_dir: PathBuf,
}

impl ScriptExecutor {
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.into(),
        }
    }

    pub fn script_path(&self, command: CommandId) -> PathBuf {
        self.script_dir.join(command.script_name())
    }
}

impl CommandExecutor for ScriptExecutor {
    fn execute(
        &self,
        command: CommandId,
        args: &[OsString],
        log: &Path,
    ) -> CommandResult<ExitKind> {
        let stdout = open_append(log)?;
        let stderr = stdout.try_clone().map_err(|source| CommandError::Log {
            path: log.to_path_buf(),
            source,
        })?;

        let script = self.script_path(command);
        let status = Command::new(SHELL)
            .arg(&script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| CommandError::Spawn { script, source })?;

        Ok(match status.code() {
            Some(code) => ExitKind::Code(code),
            None => ExitKind::Abnormal,
        })
    }
}

/// Open `path` for appending, creating it if missing
pub fn open_append(path: &Path) -> CommandResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| CommandError::Log {
            path: path.to_path_buf(),
            source,
        })
}

/// Map an exit status to an outcome for the given call shape
pub fn classify(shape: CallShape, exit: ExitKind) -> CommandOutcome {
    match (shape, exit) {
        (_, ExitKind::Abnormal) => CommandOutcome::Error,
        (CallShape::Repository, ExitKind::Code(0)) => CommandOutcome::NoOp,
        (CallShape::Repository, ExitKind::Code(2)) => CommandOutcome::Success,
        (CallShape::Repository, ExitKind::Code(_)) => CommandOutcome::Error,
        (CallShape::Pipeline, ExitKind::Code(0)) => CommandOutcome::Success,
        (CallShape::Pipeline, ExitKind::Code(_)) => CommandOutcome::Error,
    }
}

/// Argument-checked, classified command execution
#[derive(Clone)]
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl CommandRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Runner over the real scripts in `script_dir`
    pub fn scripts(script_dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(ScriptExecutor::new(script_dir)))
    }

    pub fn run(&self, command: CommandId, args: &[OsString], log: &Path) -> CommandOutcome {
        match self.try_run(command, args, log) {
            Ok(exit) => {
                let outcome = classify(command.shape(), exit);
                if outcome.is_error() {
                    warn!(%command, ?exit, log = %log.display(), "command failed");
                }
                outcome
            }
            Err(e) => {
                warn!(%command, error = %e, "command could not run");
                CommandOutcome::Error
            }
        }
    }

    fn try_run(
        &self,
        command: CommandId,
        args: &[OsString],
        log: &Path,
    ) -> CommandResult<ExitKind> {
        if args.len() != command.arity() {
            return Err(CommandError::WrongArity {
                command,
                expected: command.arity(),
                got: args.len(),
            });
        }
        self.executor.execute(command, args, log)
    }
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner").finish_non_exhaustive()
    }
}

/// Build an argument list from anything path- or string-like
#[macro_export]
macro_rules! command_args {
    ($($arg:expr),* $(,)?) => {
        vec![$(::std::ffi::OsString::from($arg)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_script(dir: &Path, command: CommandId, body: &str) {
        fs::write(dir.join(command.script_name()), body).unwrap();
    }

    #[test]
    fn test_repository_shape_classification() {
        let shape = CallShape::Repository;
        assert_eq!(classify(shape, ExitKind::Code(0)), CommandOutcome::NoOp);
        assert_eq!(classify(shape, ExitKind::Code(2)), CommandOutcome::Success);
        assert_eq!(classify(shape, ExitKind::Code(1)), CommandOutcome::Error);
        assert_eq!(classify(shape, ExitKind::Code(7)), CommandOutcome::Error);
        assert_eq!(classify(shape, ExitKind::Abnormal), CommandOutcome::Error);
    }

    #[test]
    fn test_pipeline_shape_classification() {
        let shape = CallShape::Pipeline;
        assert_eq!(classify(shape, ExitKind::Code(0)), CommandOutcome::Success);
        assert_eq!(classify(shape, ExitKind::Code(2)), CommandOutcome::Error);
        assert_eq!(classify(shape, ExitKind::Abnormal), CommandOutcome::Error);
    }

    #[test]
    fn test_shapes_by_identity() {
        for command in CommandId::ALL {
            let expected = match command {
                CommandId::Clone | CommandId::CheckCommit => CallShape::Repository,
                _ => CallShape::Pipeline,
            };
            assert_eq!(command.shape(), expected, "{}", command);
        }
    }

    #[test]
    fn test_output_goes_to_log() {
        let temp = TempDir::new().unwrap();
        write_script(
            temp.path(),
            CommandId::PatchHarness,
            "echo \"patching $1\"\necho oops >&2\nexit 0\n",
        );
        let log = temp.path().join("thread.log");
        fs::write(&log, "earlier\n").unwrap();

        let runner = CommandRunner::scripts(temp.path());
        let outcome = runner.run(
            CommandId::PatchHarness,
            &command_args!["vdens.c", &log],
            &log,
        );

        assert_eq!(outcome, CommandOutcome::Success);
        let content = fs::read_to_string(&log).unwrap();
        assert!(content.starts_with("earlier\n"));
        assert!(content.contains("patching vdens.c"));
        assert!(content.contains("oops"));
    }

    #[test]
    fn test_repository_exit_codes_from_script() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("main.log");
        let runner = CommandRunner::scripts(temp.path());
        let args = command_args!["url", "dest", &log, "versions"];

        for (code, expected) in [
            (0, CommandOutcome::NoOp),
            (1, CommandOutcome::Error),
            (2, CommandOutcome::Success),
            (3, CommandOutcome::Error),
        ] {
            write_script(temp.path(), CommandId::Clone, &format!("exit {}\n", code));
            assert_eq!(runner.run(CommandId::Clone, &args, &log), expected, "exit {}", code);
        }
    }

    #[test]
    fn test_abnormal_termination_is_error() {
        let temp = TempDir::new().unwrap();
        write_script(temp.path(), CommandId::Clone, "kill -9 $$\n");
        let log = temp.path().join("main.log");

        let executor = ScriptExecutor::new(temp.path());
        let exit = executor
            .execute(
                CommandId::Clone,
                &command_args!["url", "dest", &log, "versions"],
                &log,
            )
            .unwrap();
        assert_eq!(exit, ExitKind::Abnormal);
        assert_eq!(
            classify(CommandId::Clone.shape(), exit),
            CommandOutcome::Error
        );
    }

    #[test]
    fn test_wrong_arity_never_spawns() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("ran");
        write_script(
            temp.path(),
            CommandId::Bootstrap,
            &format!("touch {}\n", marker.display()),
        );
        let log = temp.path().join("thread.log");

        let runner = CommandRunner::scripts(temp.path());
        let outcome = runner.run(CommandId::Bootstrap, &command_args!["x86_64"], &log);

        assert_eq!(outcome, CommandOutcome::Error);
        assert!(!marker.exists());
    }

    #[test]
    fn test_unopenable_log_is_error() {
        let temp = TempDir::new().unwrap();
        write_script(temp.path(), CommandId::PatchHarness, "exit 0\n");
        let log = temp.path().join("missing-dir").join("thread.log");

        let runner = CommandRunner::scripts(temp.path());
        let outcome = runner.run(CommandId::PatchHarness, &command_args!["a", "b"], &log);
        assert_eq!(outcome, CommandOutcome::Error);
    }
}
