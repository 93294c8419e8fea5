//! Daemon state file
//!
//! States: WORKING ⇄ SLEEPING. The daemon is the only writer; the stop tool
//! waits for SLEEPING before signalling so it never interrupts a build round.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{ProtocolError, ProtocolResult};

/// Daemon state as published in the state file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Polling, building, or publishing
    Working,
    /// Waiting for the next poll
    Sleeping,
}

impl DaemonState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonState::Working => "WORKING",
            DaemonState::Sleeping => "SLEEPING",
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "WORKING" => Ok(DaemonState::Working),
            "SLEEPING" => Ok(DaemonState::Sleeping),
            other => Err(ProtocolError::UnknownState(other.to_string())),
        }
    }
}

/// The daemon's state file
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish `state` (write-then-rename, so readers never see a partial value)
    pub fn write(&self, state: DaemonState) -> ProtocolResult<()> {
        let temp_path = self.path.with_extension("state.tmp");
        fs::write(&temp_path, state.as_str()).map_err(|e| ProtocolError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| ProtocolError::io(&self.path, e))
    }

    pub fn read(&self) -> ProtocolResult<DaemonState> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| ProtocolError::io(&self.path, e))?;
        content.parse()
    }

    pub fn remove(&self) -> ProtocolResult<()> {
        fs::remove_file(&self.path).map_err(|e| ProtocolError::io(&self.path, e))
    }
}
