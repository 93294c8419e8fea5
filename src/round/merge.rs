//! Per-architecture log aggregation
//!
//! After every build round each architecture's host log (and sandbox log, if
//! present) is appended to the main log as one delimited section, then both
//! are truncated to empty. They are never deleted.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::config::Architecture;
use crate::logging::MainLog;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot read host log {path}: {source}")]
    HostLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot append to main log: {0}")]
    MainLog(#[source] io::Error),

    #[error("cannot truncate {path}: {source}")]
    Truncate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn start_marker(arch: &Architecture) -> String {
    format!("===== Start log for architecture {} =====", arch)
}

pub fn end_marker(arch: &Architecture) -> String {
    format!("===== End log for architecture {} =====", arch)
}

/// Append both logs to `main` and truncate them.
///
/// Log content is copied byte for byte; compiler output need not be UTF-8.
/// An unreadable host log skips the architecture entirely. A missing sandbox
/// log only drops its subsection.
pub fn merge_logs(
    main: &MainLog,
    arch: &Architecture,
    host_log: &Path,
    sandbox_log: &Path,
) -> Result<(), MergeError> {
    let host = fs::read(host_log).map_err(|source| MergeError::HostLog {
        path: host_log.to_path_buf(),
        source,
    })?;
    let sandbox = match fs::read(sandbox_log) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            if sandbox_log.exists() {
                warn!(%arch, path = %sandbox_log.display(), error = %e, "cannot read sandbox log");
            }
            None
        }
    };

    let mut section = Vec::new();
    push_line(&mut section, &start_marker(arch));
    push_subsection(&mut section, "host", host_log, &host);
    if let Some(ref sandbox) = sandbox {
        push_subsection(&mut section, "sandbox", sandbox_log, sandbox);
    }
    push_line(&mut section, &end_marker(arch));

    main.write_raw(&section).map_err(MergeError::MainLog)?;

    truncate(host_log)?;
    if sandbox_log.exists() {
        truncate(sandbox_log)?;
    }
    Ok(())
}

fn push_line(section: &mut Vec<u8>, line: &str) {
    section.extend_from_slice(line.as_bytes());
    section.push(b'\n');
}

fn push_subsection(section: &mut Vec<u8>, label: &str, path: &Path, content: &[u8]) {
    push_line(section, &format!("--- {} log ({}) ---", label, path.display()));
    section.extend_from_slice(content);
    if content.last().is_some_and(|&b| b != b'\n') {
        section.push(b'\n');
    }
}

fn truncate(path: &Path) -> Result<(), MergeError> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map(drop)
        .map_err(|source| MergeError::Truncate {
            path: path.to_path_buf(),
            source,
        })
}
