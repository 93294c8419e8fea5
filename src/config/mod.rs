//! Daemon configuration
//!
//! Loaded once at startup from a `KEY=VALUE` file. Every required key must be
//! present and non-empty; any problem is fatal before daemonization.

mod parse;

pub use parse::KeyValues;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Maximum number of architectures built per round
pub const MAX_ARCHITECTURES: usize = 9;

/// Maximum length of an architecture label in bytes
pub const MAX_ARCH_LEN: usize = 15;

/// Default config path when neither `--config` nor the env var is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sshlirp-ci/ci.conf";

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "SSHLIRP_CI_CONFIG";

pub const KEY_SSHLIRP_REPO_URL: &str = "SSHLIRP_REPO_URL";
pub const KEY_LIBSLIRP_REPO_URL: &str = "LIBSLIRP_REPO_URL";
pub const KEY_VDENS_REPO_URL: &str = "VDENS_REPO_URL";
pub const KEY_MAIN_DIR: &str = "MAIN_DIR";
pub const KEY_VERSIONING_FILE: &str = "VERSIONING_FILE";
pub const KEY_TARGET_DIR: &str = "TARGET_DIR";
pub const KEY_SSHLIRP_SOURCE_DIR: &str = "SSHLIRP_SOURCE_DIR";
pub const KEY_LIBSLIRP_SOURCE_DIR: &str = "LIBSLIRP_SOURCE_DIR";
pub const KEY_VDENS_SOURCE_DIR: &str = "VDENS_SOURCE_DIR";
pub const KEY_LOG_FILE: &str = "LOG_FILE";
pub const KEY_THREAD_LOG_DIR: &str = "THREAD_LOG_DIR";
pub const KEY_THREAD_CHROOT_TARGET_DIR: &str = "THREAD_CHROOT_TARGET_DIR";
pub const KEY_THREAD_CHROOT_LOG_FILE: &str = "THREAD_CHROOT_LOG_FILE";
pub const KEY_POLL_INTERVAL: &str = "POLL_INTERVAL";
pub const KEY_ARCHITECTURES: &str = "ARCHITECTURES";
pub const KEY_TEST_ENABLED: &str = "TEST_ENABLED";
pub const KEY_SCRIPT_DIR: &str = "SCRIPT_DIR";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} not found or empty in configuration")]
    MissingKey(&'static str),

    #[error("POLL_INTERVAL must be a positive number of seconds, got {0:?}")]
    InvalidPollInterval(String),

    #[error("no architectures listed in ARCHITECTURES")]
    NoArchitectures,

    #[error("too many architectures: {count} (max {max})", max = MAX_ARCHITECTURES)]
    TooManyArchitectures { count: usize },

    #[error("architecture label {0:?} is longer than {max} bytes", max = MAX_ARCH_LEN)]
    ArchitectureTooLong(String),

    #[error("architecture {0:?} listed more than once")]
    DuplicateArchitecture(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A build target label such as `x86_64`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Architecture(String);

impl Architecture {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the binary built for this architecture
    pub fn binary_name(&self) -> String {
        format!("sshlirp-{}", self.0)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A repository tracked on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: &'static str,
    pub url: String,
    pub source_dir: PathBuf,
}

/// Test-harness repository, present only when testing is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub repo_url: String,
    pub source_dir: PathBuf,
}

impl HarnessConfig {
    /// Source file rewritten before staging to disable namespaces
    pub fn patched_source(&self) -> PathBuf {
        self.source_dir.join("vdens.c")
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone)]
pub struct CiConfig {
    pub sshlirp_repo_url: String,
    pub libslirp_repo_url: String,
    /// Root of all daemon data; sandboxes live at `<main_dir>/<arch>-chroot`
    pub main_dir: PathBuf,
    /// Append-only release tag file
    pub versioning_file: PathBuf,
    /// Root of the release tree
    pub target_dir: PathBuf,
    pub sshlirp_source_dir: PathBuf,
    pub libslirp_source_dir: PathBuf,
    /// Main daemon log
    pub log_file: PathBuf,
    /// Directory of host-side per-architecture logs
    pub thread_log_dir: PathBuf,
    /// Sandbox-relative binary output directory
    pub sandbox_target_dir: PathBuf,
    /// Sandbox-relative per-architecture log file
    pub sandbox_log_file: PathBuf,
    pub poll_interval: Duration,
    pub architectures: Vec<Architecture>,
    pub harness: Option<HarnessConfig>,
    /// Directory holding the external command scripts
    pub script_dir: PathBuf,
}

impl CiConfig {
    /// Load from a config file.
    ///
    /// `SCRIPT_DIR` defaults to `script/` next to the config file. A relative
    /// config path is resolved against the current directory first, since
    /// the daemon changes directory to `/` when it detaches.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let text = fs::read_to_string(path).map_err(io_error)?;
        let path = absolute(path).map_err(io_error)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("/"));
        Self::parse(&text, base_dir)
    }

    /// Parse config text; relative defaults resolve against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> ConfigResult<Self> {
        let kv = KeyValues::parse(text);

        let architectures = parse_architectures(kv.get(KEY_ARCHITECTURES))?;
        let poll_interval = parse_poll_interval(kv.get(KEY_POLL_INTERVAL))?;

        let harness = if testing_enabled(kv.get(KEY_TEST_ENABLED)) {
            Some(HarnessConfig {
                repo_url: required(&kv, KEY_VDENS_REPO_URL)?.to_string(),
                source_dir: required_path(&kv, KEY_VDENS_SOURCE_DIR)?,
            })
        } else {
            None
        };

        let script_dir = base_dir.join(kv.get(KEY_SCRIPT_DIR).unwrap_or("script"));

        Ok(Self {
            sshlirp_repo_url: required(&kv, KEY_SSHLIRP_REPO_URL)?.to_string(),
            libslirp_repo_url: required(&kv, KEY_LIBSLIRP_REPO_URL)?.to_string(),
            main_dir: required_path(&kv, KEY_MAIN_DIR)?,
            versioning_file: required_path(&kv, KEY_VERSIONING_FILE)?,
            target_dir: required_path(&kv, KEY_TARGET_DIR)?,
            sshlirp_source_dir: required_path(&kv, KEY_SSHLIRP_SOURCE_DIR)?,
            libslirp_source_dir: required_path(&kv, KEY_LIBSLIRP_SOURCE_DIR)?,
            log_file: required_path(&kv, KEY_LOG_FILE)?,
            thread_log_dir: required_path(&kv, KEY_THREAD_LOG_DIR)?,
            sandbox_target_dir: required_path(&kv, KEY_THREAD_CHROOT_TARGET_DIR)?,
            sandbox_log_file: required_path(&kv, KEY_THREAD_CHROOT_LOG_FILE)?,
            poll_interval,
            architectures,
            harness,
            script_dir,
        })
    }

    pub fn testing_enabled(&self) -> bool {
        self.harness.is_some()
    }

    /// Repositories cloned on the host, in clone order
    pub fn repositories(&self) -> Vec<Repository> {
        let mut repos = vec![
            Repository {
                name: "sshlirp",
                url: self.sshlirp_repo_url.clone(),
                source_dir: self.sshlirp_source_dir.clone(),
            },
            Repository {
                name: "libslirp",
                url: self.libslirp_repo_url.clone(),
                source_dir: self.libslirp_source_dir.clone(),
            },
        ];
        if let Some(ref harness) = self.harness {
            repos.push(Repository {
                name: "vdens",
                url: harness.repo_url.clone(),
                source_dir: harness.source_dir.clone(),
            });
        }
        repos
    }

    /// Location of the state summary written after each build round
    pub fn round_summary_path(&self) -> PathBuf {
        self.main_dir.join("last_round.json")
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn required<'a>(kv: &'a KeyValues, key: &'static str) -> ConfigResult<&'a str> {
    kv.get(key).ok_or(ConfigError::MissingKey(key))
}

fn required_path(kv: &KeyValues, key: &'static str) -> ConfigResult<PathBuf> {
    required(kv, key).map(PathBuf::from)
}

fn testing_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn parse_poll_interval(value: Option<&str>) -> ConfigResult<Duration> {
    let raw = value.ok_or(ConfigError::MissingKey(KEY_POLL_INTERVAL))?;
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidPollInterval(raw.to_string())),
    }
}

fn parse_architectures(value: Option<&str>) -> ConfigResult<Vec<Architecture>> {
    let raw = value.ok_or(ConfigError::MissingKey(KEY_ARCHITECTURES))?;

    let mut archs: Vec<Architecture> = Vec::new();
    for label in raw.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if label.len() > MAX_ARCH_LEN {
            return Err(ConfigError::ArchitectureTooLong(label.to_string()));
        }
        if archs.iter().any(|a| a.as_str() == label) {
            return Err(ConfigError::DuplicateArchitecture(label.to_string()));
        }
        archs.push(Architecture::new(label));
    }

    match archs.len() {
        0 => Err(ConfigError::NoArchitectures),
        n if n > MAX_ARCHITECTURES => Err(ConfigError::TooManyArchitectures { count: n }),
        _ => Ok(archs),
    }
}
