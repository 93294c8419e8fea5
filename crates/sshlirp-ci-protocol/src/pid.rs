//! PID file and process liveness

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::{ProtocolError, ProtocolResult};

/// Probe a process with signal 0.
///
/// A process we are not allowed to signal (EPERM) still exists, so it counts
/// as alive.
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// The daemon's PID file: the decimal PID followed by a newline
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the recorded PID
    pub fn read(&self) -> ProtocolResult<i32> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| ProtocolError::io(&self.path, e))?;
        content
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<i32>().ok())
            .filter(|pid| *pid > 0)
            .ok_or_else(|| ProtocolError::MalformedPid {
                path: self.path.clone(),
                content: content.trim().to_string(),
            })
    }

    /// Record `pid`, replacing any previous content
    pub fn write(&self, pid: u32) -> ProtocolResult<()> {
        let temp_path = self.path.with_extension("pid.tmp");
        fs::write(&temp_path, format!("{}\n", pid)).map_err(|e| ProtocolError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| ProtocolError::io(&self.path, e))
    }

    /// The recorded PID, if the file exists, parses, and names a live process
    pub fn live_pid(&self) -> Option<i32> {
        self.read().ok().filter(|pid| process_alive(*pid))
    }

    pub fn remove(&self) -> ProtocolResult<()> {
        fs::remove_file(&self.path).map_err(|e| ProtocolError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let pid_file = PidFile::new(temp.path().join("d.pid"));

        pid_file.write(4242).unwrap();
        assert_eq!(fs::read_to_string(pid_file.path()).unwrap(), "4242\n");
        assert_eq!(pid_file.read().unwrap(), 4242);
    }

    #[test]
    fn test_malformed_pid() {
        let temp = TempDir::new().unwrap();
        let pid_file = PidFile::new(temp.path().join("d.pid"));
        fs::write(pid_file.path(), "not-a-pid\n").unwrap();

        assert!(matches!(
            pid_file.read(),
            Err(ProtocolError::MalformedPid { .. })
        ));
        assert!(pid_file.live_pid().is_none());
    }

    #[test]
    fn test_missing_pid_file() {
        let temp = TempDir::new().unwrap();
        let pid_file = PidFile::new(temp.path().join("missing.pid"));
        let err = pid_file.read().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_own_process_is_alive() {
        assert!(process_alive(std::process::id() as i32));
        assert!(!process_alive(0));
        assert!(!process_alive(-1));
    }

    #[test]
    fn test_live_pid_for_current_process() {
        let temp = TempDir::new().unwrap();
        let pid_file = PidFile::new(temp.path().join("d.pid"));
        pid_file.write(std::process::id()).unwrap();
        assert_eq!(pid_file.live_pid(), Some(std::process::id() as i32));
    }
}
