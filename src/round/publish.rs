//! Release publication
//!
//! Binaries move from `<sandbox><target>/bin/sshlirp-<arch>` to
//! `<TARGET_DIR>/<release>/sshlirp-<arch>`. If the release directory cannot
//! be created the flat `<TARGET_DIR>` is used instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Architecture;

/// What happened to one architecture's binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    Published(PathBuf),
    /// No binary was built; skipped
    MissingBinary,
    Failed(String),
}

impl Publication {
    pub fn published_path(&self) -> Option<&Path> {
        match self {
            Publication::Published(path) => Some(path),
            _ => None,
        }
    }
}

/// Release directory for `label`, created if missing, or `target_dir` if it
/// cannot be created.
pub fn release_dir(target_dir: &Path, label: &str) -> PathBuf {
    let dir = target_dir.join(label);
    if dir.is_dir() {
        return dir;
    }
    match fs::create_dir(&dir) {
        Ok(()) => {
            info!(release = label, dir = %dir.display(), "release directory created");
            dir
        }
        Err(e) => {
            warn!(
                release = label,
                error = %e,
                fallback = %target_dir.display(),
                "cannot create release directory"
            );
            target_dir.to_path_buf()
        }
    }
}

/// Move `source` into `dest_dir` as `sshlirp-<arch>`, replacing any
/// previous binary.
pub fn publish_binary(arch: &Architecture, source: &Path, dest_dir: &Path) -> Publication {
    if !source.is_file() {
        info!(arch = %arch, source = %source.display(), "no binary to publish, skipped");
        return Publication::MissingBinary;
    }

    let dest = dest_dir.join(arch.binary_name());
    if let Err(e) = remove_existing(&dest) {
        warn!(arch = %arch, dest = %dest.display(), error = %e, "cannot remove previous binary");
    }

    match move_file(source, &dest) {
        Ok(()) => {
            info!(arch = %arch, dest = %dest.display(), "binary published");
            Publication::Published(dest)
        }
        Err(e) => {
            warn!(arch = %arch, dest = %dest.display(), error = %e, "cannot publish binary");
            Publication::Failed(e.to_string())
        }
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Rename, falling back to copy + remove across filesystems
fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    fs::copy(source, dest)?;
    fs::remove_file(source)
}
