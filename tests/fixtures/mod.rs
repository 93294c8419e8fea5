//! Shared fixtures: a temp-dir CI layout driven by the fake toolchain

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sshlirp_ci::daemon;
use sshlirp_ci::logging::MainLog;
use sshlirp_ci::mock::FakeToolchain;
use sshlirp_ci::sandbox::{sandbox_root, host_log_path};
use sshlirp_ci::{Architecture, CiConfig, CommandRunner, Orchestrator, ShutdownToken};
use sshlirp_ci_protocol::RuntimePaths;
use tempfile::TempDir;

pub const SANDBOX_TARGET_DIR: &str = "/build/target";
pub const SANDBOX_LOG_FILE: &str = "/build/log/thread.log";

pub struct Harness {
    pub temp: TempDir,
    pub config: CiConfig,
    pub runtime: RuntimePaths,
}

impl Harness {
    pub fn new(archs: &str) -> Self {
        Self::with_extra(archs, "")
    }

    pub fn with_testing(archs: &str) -> Self {
        Self::with_extra(archs, "TEST_ENABLED=1\nVDENS_REPO_URL=https://example.org/vdens.git\nVDENS_SOURCE_DIR={root}/vdens\n")
    }

    fn with_extra(archs: &str, extra: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("ci");
        let root = root.display().to_string();
        let text = format!(
            "\
SSHLIRP_REPO_URL=https://example.org/sshlirp.git
LIBSLIRP_REPO_URL=https://example.org/libslirp.git
MAIN_DIR={root}
VERSIONING_FILE={root}/versions.txt
TARGET_DIR={root}/binaries
SSHLIRP_SOURCE_DIR={root}/sshlirp
LIBSLIRP_SOURCE_DIR={root}/libslirp
LOG_FILE={root}/log/main.log
THREAD_LOG_DIR={root}/log/threads
THREAD_CHROOT_TARGET_DIR={target}
THREAD_CHROOT_LOG_FILE={log}
POLL_INTERVAL=1
ARCHITECTURES={archs}
{extra}",
            root = root,
            target = SANDBOX_TARGET_DIR,
            log = SANDBOX_LOG_FILE,
            archs = archs,
            extra = extra.replace("{root}", &root),
        );

        let mut config = CiConfig::parse(&text, temp.path()).unwrap();
        config.poll_interval = Duration::from_millis(20);
        daemon::prepare_layout(&config).unwrap();

        let runtime_dir = temp.path().join("run");
        fs::create_dir(&runtime_dir).unwrap();

        Self {
            temp,
            config,
            runtime: RuntimePaths::new(runtime_dir),
        }
    }

    pub fn orchestrator(&self, fake: &Arc<FakeToolchain>, shutdown: ShutdownToken) -> Orchestrator {
        let main_log = MainLog::open(&self.config.log_file).unwrap();
        Orchestrator::new(
            self.config.clone(),
            self.runner(fake),
            main_log,
            self.runtime.state_file(),
            shutdown,
        )
    }

    pub fn runner(&self, fake: &Arc<FakeToolchain>) -> CommandRunner {
        CommandRunner::new(fake.clone())
    }

    pub fn arch(label: &str) -> Architecture {
        Architecture::new(label)
    }

    pub fn published(&self, release: &str, arch: &str) -> PathBuf {
        self.config
            .target_dir
            .join(release)
            .join(format!("sshlirp-{}", arch))
    }

    pub fn host_log(&self, arch: &str) -> PathBuf {
        host_log_path(&self.config, &Self::arch(arch))
    }

    pub fn sandbox_root(&self, arch: &str) -> PathBuf {
        sandbox_root(&self.config, &Self::arch(arch))
    }

    /// Host view of a sandbox-relative path
    pub fn in_sandbox(&self, arch: &str, rel: &Path) -> PathBuf {
        sshlirp_ci::sandbox::sandbox_path(&self.sandbox_root(arch), rel)
    }

    pub fn main_log(&self) -> String {
        fs::read_to_string(&self.config.log_file).unwrap_or_default()
    }

    pub fn write_versions(&self, content: &str) {
        fs::write(&self.config.versioning_file, content).unwrap();
    }
}

/// True if `dir` is missing or has no entries
pub fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
