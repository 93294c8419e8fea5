//! Main daemon log
//!
//! Milestone events go through `tracing`; merged per-architecture logs are
//! written raw. Both share one append-only file handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive
pub const LOG_FILTER_ENV: &str = "SSHLIRP_CI_LOG";

/// Append-only handle on the main log
#[derive(Debug, Clone)]
pub struct MainLog {
    path: PathBuf,
    file: Arc<File>,
}

impl MainLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` as a single append
    pub fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file: &File = &self.file;
        file.write_all(bytes)
    }

    /// Route `tracing` events into this file.
    ///
    /// Returns false if a global subscriber was already installed.
    pub fn init_tracing(&self) -> bool {
        let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::clone(&self.file))
                    .with_ansi(false),
            )
            .try_init()
            .is_ok()
    }
}
