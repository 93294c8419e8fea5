//! Fake toolchain
//!
//! In-process [`CommandExecutor`] that simulates every command script on the
//! filesystem, for driving the daemon in tests without git, chroot, or a
//! compiler.
//!
//! - `gitClone.sh`: creates `<dest>/.git`, appends the configured release
//!   label, exits 2; exits 0 if `<dest>/.git` already exists
//! - `checkCommit.sh`: answers from a queue of [`PollResponse`]s, default
//!   unchanged
//! - `chrootSetup.sh`: records enter/exit instants, sleeps the configured delay
//! - `copySource.sh` / `removeSourceCopy.sh`: copy in, empty out
//! - `modifyVdens.sh`: appends a marker to the harness file
//! - `compile.sh`: writes `<target>/bin/sshlirp-<arch>` into the sandbox
//! - `test.sh`: checks the binary exists
//!
//! Any command can be made to fail for a given architecture.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::command::{open_append, CommandError, CommandExecutor, CommandId, CommandResult, ExitKind};
use crate::sandbox::sandbox_path;

/// Scripted answer for the next commit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    Unchanged,
    /// New commits; the label is appended to the versioning file
    Updated(String),
    Error,
}

/// One recorded command call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: CommandId,
    pub args: Vec<OsString>,
    pub log: PathBuf,
}

/// Time spent inside one bootstrap call
#[derive(Debug, Clone)]
pub struct BootstrapSpan {
    pub arch: String,
    pub entered: Instant,
    pub exited: Instant,
}

impl BootstrapSpan {
    pub fn overlaps(&self, other: &BootstrapSpan) -> bool {
        self.entered < other.exited && other.entered < self.exited
    }
}

/// Filesystem-simulating stand-in for the command scripts
#[derive(Debug, Default)]
pub struct FakeToolchain {
    clone_release: Option<String>,
    clone_exit: Option<i32>,
    bootstrap_delay: Duration,
    failures: HashMap<CommandId, HashSet<String>>,
    polls: Mutex<VecDeque<PollResponse>>,
    calls: Mutex<Vec<Invocation>>,
    bootstraps: Mutex<Vec<BootstrapSpan>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label appended to the versioning file whenever a clone happens
    pub fn with_clone_release(mut self, label: impl Into<String>) -> Self {
        self.clone_release = Some(label.into());
        self
    }

    /// Force every clone call to exit with `code`, without side effects
    pub fn with_clone_exit(mut self, code: i32) -> Self {
        self.clone_exit = Some(code);
        self
    }

    pub fn with_bootstrap_delay(mut self, delay: Duration) -> Self {
        self.bootstrap_delay = delay;
        self
    }

    /// Make `command` exit 1 for `arch`
    pub fn failing(mut self, command: CommandId, arch: &str) -> Self {
        self.failures
            .entry(command)
            .or_default()
            .insert(arch.to_string());
        self
    }

    /// Queue the answer for a future commit check
    pub fn push_poll(&self, response: PollResponse) {
        lock(&self.polls).push_back(response);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, command: CommandId) -> Vec<Invocation> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.command == command)
            .cloned()
            .collect()
    }

    pub fn bootstrap_spans(&self) -> Vec<BootstrapSpan> {
        lock(&self.bootstraps).clone()
    }

    fn fails(&self, command: CommandId, arch: &str) -> bool {
        self.failures
            .get(&command)
            .is_some_and(|archs| archs.contains(arch))
    }

    fn simulate(&self, command: CommandId, args: &[PathBuf], log: &mut fs::File) -> io::Result<i32> {
        match command {
            CommandId::Clone => self.clone_repo(&args[1], &args[3]),
            CommandId::CheckCommit => self.check_commit(&args[5]),
            CommandId::Bootstrap => Ok(self.bootstrap(&args[0].to_string_lossy(), &args[1])),
            CommandId::CopySources => {
                let arch = arch_of_root(&args[1]);
                if self.fails(command, &arch) {
                    return Ok(1);
                }
                copy_tree(&args[0], &sandbox_path(&args[1], &args[2]))?;
                Ok(0)
            }
            CommandId::PatchHarness => {
                if !args[0].is_file() {
                    writeln!(log, "harness source {} not found", args[0].display())?;
                    return Ok(1);
                }
                let mut file = open_append(&args[0]).map_err(into_io)?;
                writeln!(file, "/* namespaces disabled for chroot */")?;
                Ok(0)
            }
            CommandId::Compile => {
                let arch = args[4].to_string_lossy().into_owned();
                if self.fails(command, &arch) {
                    writeln!(log, "compile error for {}", arch)?;
                    return Ok(1);
                }
                let bin_dir = sandbox_path(&args[0], &args[3]).join("bin");
                fs::create_dir_all(&bin_dir)?;
                fs::write(bin_dir.join(format!("sshlirp-{}", arch)), format!("sshlirp for {}\n", arch))?;
                writeln!(log, "built sshlirp-{}", arch)?;
                Ok(0)
            }
            CommandId::Test => {
                let arch = args[0]
                    .file_name()
                    .map(|n| n.to_string_lossy().trim_start_matches("sshlirp-").to_string())
                    .unwrap_or_default();
                let built = sandbox_path(&args[1], &args[0]).is_file();
                Ok(if built && !self.fails(command, &arch) { 0 } else { 1 })
            }
            CommandId::RemoveSources => {
                let arch = arch_of_root(&args[0]);
                if self.fails(command, &arch) {
                    return Ok(1);
                }
                empty_dir(&sandbox_path(&args[0], &args[1]))?;
                empty_dir(&sandbox_path(&args[0], &args[2]))?;
                Ok(0)
            }
        }
    }

    fn clone_repo(&self, dest: &Path, versioning: &Path) -> io::Result<i32> {
        if let Some(code) = self.clone_exit {
            return Ok(code);
        }
        if dest.join(".git").is_dir() {
            return Ok(0);
        }
        fs::create_dir_all(dest.join(".git"))?;
        fs::write(dest.join("main.c"), "int main(void) { return 0; }\n")?;
        if let Some(ref label) = self.clone_release {
            append_line(versioning, label)?;
        }
        Ok(2)
    }

    fn check_commit(&self, versioning: &Path) -> io::Result<i32> {
        let response = lock(&self.polls).pop_front().unwrap_or(PollResponse::Unchanged);
        match response {
            PollResponse::Unchanged => Ok(0),
            PollResponse::Updated(label) => {
                append_line(versioning, &label)?;
                Ok(2)
            }
            PollResponse::Error => Ok(1),
        }
    }

    fn bootstrap(&self, arch: &str, root: &Path) -> i32 {
        let entered = Instant::now();
        if !self.bootstrap_delay.is_zero() {
            thread::sleep(self.bootstrap_delay);
        }
        let ok = root.is_dir() && !self.fails(CommandId::Bootstrap, arch);
        lock(&self.bootstraps).push(BootstrapSpan {
            arch: arch.to_string(),
            entered,
            exited: Instant::now(),
        });
        if ok {
            0
        } else {
            1
        }
    }
}

impl CommandExecutor for FakeToolchain {
    fn execute(
        &self,
        command: CommandId,
        args: &[OsString],
        log: &Path,
    ) -> CommandResult<ExitKind> {
        lock(&self.calls).push(Invocation {
            command,
            args: args.to_vec(),
            log: log.to_path_buf(),
        });
        if args.len() != command.arity() {
            return Err(CommandError::WrongArity {
                command,
                expected: command.arity(),
                got: args.len(),
            });
        }

        let mut log_file = open_append(log)?;
        let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
        let _ = writeln!(log_file, "[fake] {}", command);

        self.simulate(command, &paths, &mut log_file)
            .map(ExitKind::Code)
            .map_err(|e| CommandError::Other(format!("{}: {}", command, e)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn into_io(e: CommandError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// `/x/y/<arch>-chroot` -> `<arch>`
fn arch_of_root(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().trim_end_matches("-chroot").to_string())
        .unwrap_or_default()
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = open_append(path).map_err(into_io)?;
    writeln!(file, "{}", line)
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

fn empty_dir(dir: &Path) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clone_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let fake = FakeToolchain::new().with_clone_release("v1.0");
        let dest = temp.path().join("sshlirp");
        let versions = temp.path().join("versions.txt");
        let log = temp.path().join("main.log");
        let args = crate::command_args!["url", &dest, &log, &versions];

        assert_eq!(
            fake.execute(CommandId::Clone, &args, &log).unwrap(),
            ExitKind::Code(2)
        );
        assert_eq!(
            fake.execute(CommandId::Clone, &args, &log).unwrap(),
            ExitKind::Code(0)
        );
        assert_eq!(fs::read_to_string(&versions).unwrap(), "v1.0\n");
        assert_eq!(fake.calls_of(CommandId::Clone).len(), 2);
    }

    #[test]
    fn test_poll_queue() {
        let temp = TempDir::new().unwrap();
        let fake = FakeToolchain::new();
        let versions = temp.path().join("versions.txt");
        let log = temp.path().join("main.log");
        let args = crate::command_args!["a", "b", "c", "d", &log, &versions];

        fake.push_poll(PollResponse::Updated("v2".into()));
        fake.push_poll(PollResponse::Error);

        let exits: Vec<ExitKind> = (0..3)
            .map(|_| fake.execute(CommandId::CheckCommit, &args, &log).unwrap())
            .collect();
        assert_eq!(
            exits,
            vec![ExitKind::Code(2), ExitKind::Code(1), ExitKind::Code(0)]
        );
        assert_eq!(fs::read_to_string(&versions).unwrap(), "v2\n");
    }

    #[test]
    fn test_span_overlap() {
        let now = Instant::now();
        let span = |from: u64, to: u64| BootstrapSpan {
            arch: String::new(),
            entered: now + Duration::from_millis(from),
            exited: now + Duration::from_millis(to),
        };
        assert!(span(0, 10).overlaps(&span(5, 15)));
        assert!(!span(0, 10).overlaps(&span(10, 20)));
    }
}
