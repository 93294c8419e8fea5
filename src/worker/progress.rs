//! Stage progress and worker results

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Bootstrap,
    WorkingDirs,
    StageSources,
    Compile,
    Test,
    RemoveSources,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Bootstrap => "bootstrap",
            Stage::WorkingDirs => "working dirs",
            Stage::StageSources => "stage sources",
            Stage::Compile => "compile",
            Stage::Test => "test",
            Stage::RemoveSources => "remove sources",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Done,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Done => "done",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }

    /// Whether the stage counts towards progress
    pub fn is_resolved(&self) -> bool {
        matches!(self, StageStatus::Done | StageStatus::Skipped)
    }
}

/// One `<stage>: <status>` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
}

impl fmt::Display for StageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.status.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerOutcome {
    Success,
    Failure,
}

/// What a worker hands back at join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResult {
    pub outcome: WorkerOutcome,
    pub error: Option<String>,
    /// Append-only, in execution order
    pub progress: Vec<StageRecord>,
    pub expected_stages: usize,
}

impl WorkerResult {
    pub fn new(expected_stages: usize) -> Self {
        Self {
            outcome: WorkerOutcome::Success,
            error: None,
            progress: Vec::new(),
            expected_stages,
        }
    }

    /// Result for a worker that ended without producing one
    pub fn missing() -> Self {
        Self {
            outcome: WorkerOutcome::Failure,
            error: None,
            progress: Vec::new(),
            expected_stages: 0,
        }
    }

    /// Mark failed; the first message is kept
    pub fn fail(&mut self, message: impl Into<String>) {
        self.outcome = WorkerOutcome::Failure;
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == WorkerOutcome::Success
    }

    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.progress
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.status)
    }

    /// Floor percentage of resolved stages over the expected total
    pub fn progress_percent(&self) -> u32 {
        if self.expected_stages == 0 {
            return 0;
        }
        let resolved = self
            .progress
            .iter()
            .filter(|r| r.status.is_resolved())
            .count();
        (resolved * 100 / self.expected_stages) as u32
    }

    /// `Progress: X%`
    pub fn progress_line(&self) -> String {
        format!("Progress: {}%", self.progress_percent())
    }

    /// Stage entries followed by the progress line
    pub fn progress_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.progress.iter().map(ToString::to_string).collect();
        lines.push(self.progress_line());
        lines
    }
}
