//! Workflow run state
//!
//! A [`WorkflowContext`] is the whole durable state of one run: what was
//! asked, how it was classified, the pipeline, and one [`StageRecord`] per
//! pipeline entry. It is persisted after every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::handler::{AgentResult, AgentStatus};
use super::task_type::TaskType;
use crate::{Error, Result};

/// Opaque key-value payload passed between stages
pub type Payload = serde_json::Map<String, Value>;

/// Workflow run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Unique run ID
    pub id: String,
    /// Original task description
    pub description: String,
    /// Detected task type
    pub task_type: TaskType,
    /// Ordered stage names
    pub pipeline: Vec<String>,
    /// Per-stage state, one entry per pipeline stage
    pub stages: HashMap<String, StageRecord>,
    /// When the run was created
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Overall status
    pub status: RunStatus,
    /// Stage currently executing, or the last one executed
    pub current_agent: Option<String>,
    /// Caller-supplied metadata, never interpreted by the engine
    #[serde(default)]
    pub metadata: Payload,
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started
    Pending,
    /// Currently running
    Running,
    /// Every stage finished without error
    Completed,
    /// A stage reported an error
    Failed,
}

/// State of a single stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage status
    pub status: StageStatus,
    /// When the stage started
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage finished
    pub completed_at: Option<DateTime<Utc>>,
    /// Input handed to the handler
    #[serde(default)]
    pub input_data: Payload,
    /// Output returned by the handler
    #[serde(default)]
    pub output_data: Payload,
    /// Error or skip reason
    pub error: Option<String>,
}

impl Default for StageRecord {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            input_data: Payload::new(),
            output_data: Payload::new(),
            error: None,
        }
    }
}

/// Status of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started
    Pending,
    /// Currently running
    InProgress,
    /// Handler reported success
    Completed,
    /// Handler reported an error
    Failed,
    /// No handler, handler declined, or jumped over
    Skipped,
}

impl From<AgentStatus> for StageStatus {
    fn from(status: AgentStatus) -> Self {
        match status {
            AgentStatus::Success => StageStatus::Completed,
            AgentStatus::Error => StageStatus::Failed,
            AgentStatus::Skipped => StageStatus::Skipped,
        }
    }
}

impl WorkflowContext {
    /// Create a new run with every stage pending
    pub fn new(
        description: &str,
        task_type: TaskType,
        pipeline: Vec<String>,
        metadata: Payload,
    ) -> Self {
        let stages = pipeline
            .iter()
            .map(|stage| (stage.clone(), StageRecord::default()))
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            task_type,
            pipeline,
            stages,
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Pending,
            current_agent: None,
            metadata,
        }
    }

    /// Check that there is exactly one record per pipeline entry
    pub fn validate(&self) -> Result<()> {
        let unique: HashSet<&str> = self.pipeline.iter().map(String::as_str).collect();
        if unique.len() != self.pipeline.len() {
            return Err(Error::Persistence(format!(
                "Run {} has duplicate stages in its pipeline",
                self.id
            )));
        }
        if self.stages.len() != self.pipeline.len()
            || !self.pipeline.iter().all(|s| self.stages.contains_key(s))
        {
            return Err(Error::Persistence(format!(
                "Run {} has stage records that do not match its pipeline",
                self.id
            )));
        }
        Ok(())
    }

    /// Mark the run as running
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.completed_at = None;
    }

    /// Start a stage
    pub fn start_stage(&mut self, stage: &str, input: Payload) {
        self.current_agent = Some(stage.to_string());

        if let Some(record) = self.stages.get_mut(stage) {
            record.status = StageStatus::InProgress;
            record.started_at = Some(Utc::now());
            record.completed_at = None;
            record.input_data = input;
            record.output_data = Payload::new();
            record.error = None;
        }
    }

    /// Fold a handler result into the stage's record
    pub fn finish_stage(&mut self, stage: &str, result: &AgentResult) {
        if let Some(record) = self.stages.get_mut(stage) {
            record.status = result.status.into();
            record.completed_at = Some(Utc::now());
            record.output_data = result.data.clone();
            record.error = result.error.clone();
        }
    }

    /// Skip a stage without running it
    pub fn skip_stage(&mut self, stage: &str, reason: &str) {
        if let Some(record) = self.stages.get_mut(stage) {
            record.status = StageStatus::Skipped;
            record.completed_at = Some(Utc::now());
            record.error = Some(reason.to_string());
        }
    }

    /// Complete the run
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Fail the run
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Whether the run has reached completed or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }

    /// Index of the first stage that still has to run
    pub fn resume_point(&self) -> Option<usize> {
        self.pipeline.iter().position(|stage| {
            self.stages
                .get(stage)
                .map(|r| matches!(r.status, StageStatus::Pending | StageStatus::InProgress))
                .unwrap_or(false)
        })
    }

    /// Last settled stage in pipeline order that produced output
    pub fn last_output(&self) -> Option<(&str, &StageRecord)> {
        self.records().rev().find(|(_, r)| {
            matches!(r.status, StageStatus::Completed | StageStatus::Skipped)
                && !r.output_data.is_empty()
        })
    }

    /// Input for the first stage: the description and caller metadata
    pub fn initial_input(&self) -> Payload {
        let mut input = Payload::new();
        input.insert("task".to_string(), Value::String(self.description.clone()));
        input.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        input
    }

    /// Stage records in pipeline order
    pub fn records(&self) -> impl DoubleEndedIterator<Item = (&str, &StageRecord)> {
        self.pipeline
            .iter()
            .filter_map(|stage| self.stages.get(stage).map(|r| (stage.as_str(), r)))
    }

    /// Get summary of run progress
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Run: {}", self.id),
            format!("Task: {}", self.description),
            format!("Type: {}", self.task_type),
            format!("Status: {:?}", self.status),
            format!("Current: {}", self.current_agent.as_deref().unwrap_or("-")),
            String::new(),
            "Stages:".to_string(),
        ];

        for (name, record) in self.records() {
            let icon = match record.status {
                StageStatus::Pending => "⬜",
                StageStatus::InProgress => "🔄",
                StageStatus::Completed => "✅",
                StageStatus::Skipped => "⏭️",
                StageStatus::Failed => "❌",
            };
            let mut line = format!("  {} {}: {:?}", icon, name, record.status);
            if let Some(ref error) = record.error {
                line.push_str(&format!(" ({})", error));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}
