//! Per-architecture, per-round worker parameters

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{Architecture, CiConfig};

/// The one lock shared by all workers, held only around sandbox bootstrap
#[derive(Debug, Clone, Default)]
pub struct BootstrapLock(Arc<Mutex<()>>);

impl BootstrapLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock. A worker that panicked while holding it leaves no
    /// state behind, so poisoning is ignored.
    pub fn hold(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Join a sandbox-relative absolute path onto a sandbox root
pub fn sandbox_path(root: &Path, rel: &Path) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(rel.components().filter(|c| {
        !matches!(c, Component::RootDir | Component::Prefix(_))
    }));
    path
}

/// Everything one worker needs for one round
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub arch: Architecture,
    pub round: u64,
    /// `<MAIN_DIR>/<arch>-chroot`
    pub sandbox_root: PathBuf,
    pub host_sshlirp_dir: PathBuf,
    pub host_libslirp_dir: PathBuf,
    /// Host harness checkout, when testing is enabled
    pub host_harness_dir: Option<PathBuf>,
    /// Host view of the staged harness file to patch, when testing is enabled
    pub harness_patch_file: Option<PathBuf>,
    /// Host-side per-architecture log
    pub host_log: PathBuf,

    // Sandbox-relative paths, as seen from inside the sandbox
    pub sandbox_main_dir: PathBuf,
    pub sandbox_sshlirp_dir: PathBuf,
    pub sandbox_libslirp_dir: PathBuf,
    pub sandbox_harness_dir: Option<PathBuf>,
    pub sandbox_target_dir: PathBuf,
    pub sandbox_log: PathBuf,

    pub bootstrap_lock: BootstrapLock,
}

impl WorkerContext {
    pub fn new(config: &CiConfig, arch: &Architecture, round: u64, lock: BootstrapLock) -> Self {
        let harness = config.harness.as_ref();
        let root = sandbox_root(config, arch);
        Self {
            arch: arch.clone(),
            round,
            host_sshlirp_dir: config.sshlirp_source_dir.clone(),
            host_libslirp_dir: config.libslirp_source_dir.clone(),
            host_harness_dir: harness.map(|h| h.source_dir.clone()),
            harness_patch_file: harness.map(|h| sandbox_path(&root, &h.patched_source())),
            host_log: host_log_path(config, arch),
            sandbox_main_dir: config.main_dir.clone(),
            sandbox_sshlirp_dir: config.sshlirp_source_dir.clone(),
            sandbox_libslirp_dir: config.libslirp_source_dir.clone(),
            sandbox_harness_dir: harness.map(|h| h.source_dir.clone()),
            sandbox_target_dir: config.sandbox_target_dir.clone(),
            sandbox_log: config.sandbox_log_file.clone(),
            sandbox_root: root,
            bootstrap_lock: lock,
        }
    }

    pub fn testing_enabled(&self) -> bool {
        self.sandbox_harness_dir.is_some()
    }

    /// Host view of a sandbox-relative path
    pub fn in_sandbox(&self, rel: &Path) -> PathBuf {
        sandbox_path(&self.sandbox_root, rel)
    }

    /// Host view of the sandbox log
    pub fn sandbox_log_on_host(&self) -> PathBuf {
        self.in_sandbox(&self.sandbox_log)
    }

    /// Built binary, as seen from inside the sandbox
    pub fn sandbox_binary(&self) -> PathBuf {
        self.sandbox_target_dir
            .join("bin")
            .join(self.arch.binary_name())
    }

    /// Built binary, as seen from the host
    pub fn binary_on_host(&self) -> PathBuf {
        self.in_sandbox(&self.sandbox_binary())
    }
}

/// `<MAIN_DIR>/<arch>-chroot`
pub fn sandbox_root(config: &CiConfig, arch: &Architecture) -> PathBuf {
    config.main_dir.join(format!("{}-chroot", arch))
}

/// `<THREAD_LOG_DIR>/<arch>-thread.log`
pub fn host_log_path(config: &CiConfig, arch: &Architecture) -> PathBuf {
    config.thread_log_dir.join(format!("{}-thread.log", arch))
}
