//! Run state: the records a workflow run accumulates while it executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::artifacts::ArtifactStore;

/// Status of a run or of one of its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub assignment_id: String,
    pub persona_name: String,
    pub model: String,
    /// Text, or a `data:<mime>;base64,...` URL for image output
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub output_artifact_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: String,
    pub name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agent_results: Vec<AgentResult>,
}

impl StageResult {
    pub fn started(stage_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            name: name.into(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            agent_results: Vec::new(),
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// The full state of one execution of a gem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub gem_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub stage_results: Vec<StageResult>,
    /// Empty until the run completes
    pub final_output: String,
    pub initial_prompt: String,
    pub artifacts: ArtifactStore,
}

impl WorkflowRun {
    /// A fresh RUNNING run with the prompt already seeded.
    pub fn start(gem_id: impl Into<String>, initial_prompt: impl Into<String>) -> Self {
        let initial_prompt = initial_prompt.into();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            gem_id: gem_id.into(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            stage_results: Vec::new(),
            final_output: String::new(),
            artifacts: ArtifactStore::seeded(initial_prompt.clone()),
            initial_prompt,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Move the run into a terminal state. Returns `false` (and changes
    /// nothing) when the run already left RUNNING.
    pub fn finish(&mut self, status: RunStatus) -> bool {
        if !self.is_running() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        true
    }

    /// Move a RUNNING run to CANCELLED, closing any stage still in flight.
    /// Returns `false` if the run was already terminal.
    pub fn cancel(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        let now = Utc::now();
        for stage in self
            .stage_results
            .iter_mut()
            .filter(|s| s.status == RunStatus::Running)
        {
            stage.status = RunStatus::Cancelled;
            stage.end_time = Some(now);
        }
        self.finish(RunStatus::Cancelled)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
