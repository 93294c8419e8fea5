//! Round summary (last_round.json)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::{StageRecord, WorkerOutcome, WorkerResult};

use super::publish::Publication;

/// Schema identifier for last_round.json
pub const ROUND_SUMMARY_SCHEMA_ID: &str = "sshlirp-ci/round_summary@1";

/// Summary of the most recent build round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub schema_id: String,
    pub round: u64,
    /// Label the binaries were published under
    pub release: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub architectures: Vec<ArchitectureSummary>,
}

/// One architecture's part of a round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureSummary {
    pub arch: String,
    pub outcome: WorkerOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stages: Vec<StageRecord>,
    pub progress_percent: u32,
    /// Final binary location, if publication succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<PathBuf>,
}

impl ArchitectureSummary {
    pub fn new(arch: &str, result: &WorkerResult, publication: &Publication) -> Self {
        Self {
            arch: arch.to_string(),
            outcome: result.outcome,
            error: result.error.clone(),
            stages: result.progress.clone(),
            progress_percent: result.progress_percent(),
            published: publication.published_path().map(Path::to_path_buf),
        }
    }
}

impl RoundSummary {
    pub fn new(round: u64, release: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            schema_id: ROUND_SUMMARY_SCHEMA_ID.to_string(),
            round,
            release: release.into(),
            started_at,
            finished_at: started_at,
            architectures: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.architectures
            .iter()
            .filter(|a| a.outcome == WorkerOutcome::Success)
            .count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write atomically (temp file + rename)
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }
}
