use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
    /// Terminal and non-participating; never executed.
    NotImplemented,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Error | StageStatus::NotImplemented
        )
    }

    /// Whether this stage counts towards run completion.
    pub fn participates(&self) -> bool {
        !matches!(self, StageStatus::NotImplemented)
    }

    /// Pending or error stages are the only ones that may be (re)started.
    pub fn is_runnable(&self) -> bool {
        matches!(self, StageStatus::Pending | StageStatus::Error)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Error => write!(f, "error"),
            StageStatus::NotImplemented => write!(f, "not_implemented"),
        }
    }
}

/// Derived status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Waiting,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Waiting => write!(f, "waiting"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Classification of a stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An external collaborator (text generation, speech, transcoding, fetch) failed.
    Collaborator,
    /// Input violated a data contract: missing voice, bad segment list, empty text.
    Contract,
    Storage,
    Internal,
}

/// Error detail recorded on a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub message: String,
    pub kind: FailureKind,
    #[serde(default)]
    pub context: Value,
}

impl StageFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable stage name, unique within a run (e.g. `script-generation`).
    pub id: String,
    pub name: String,
    pub description: String,
    pub service: String,
    pub ai_stage: bool,
    /// 1-based, contiguous within a run.
    pub order: u32,
    pub status: StageStatus,
    pub output: Option<Value>,
    #[serde(default)]
    pub asset_refs: Vec<String>,
    pub error: Option<StageFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Stage {
    /// Copy of this stage as it would look before it ever ran.
    pub fn reset(&self) -> Stage {
        let status = if self.status == StageStatus::NotImplemented {
            StageStatus::NotImplemented
        } else {
            StageStatus::Pending
        };
        Stage {
            status,
            output: None,
            asset_refs: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Where a restarted run came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartOrigin {
    pub run_id: String,
    pub from_order: u32,
    pub snapshot_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub title: String,
    pub source_url: String,
    /// Target narration length in seconds.
    pub target_duration: f64,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered by `order`.
    #[serde(default)]
    pub stages: Vec<Stage>,
    pub final_outputs: Option<Value>,
    pub restarted_from: Option<RestartOrigin>,
}

impl Run {
    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn stage_by_order(&self, order: u32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.order == order)
    }

    /// Output of a completed stage, if any.
    pub fn completed_output(&self, stage_id: &str) -> Option<&Value> {
        self.stage(stage_id)
            .filter(|s| s.status == StageStatus::Completed)
            .and_then(|s| s.output.as_ref())
    }

    /// The run record without its stage list; stages are stored separately.
    pub fn header(&self) -> Run {
        Run {
            stages: Vec::new(),
            ..self.clone()
        }
    }
}

/// Immutable labeled copy of a run's stage list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub run_id: String,
    pub label: String,
    pub note: Option<String>,
    pub run_title: String,
    pub total_stages: usize,
    pub completed_stages: usize,
    /// Created by a restart rather than an explicit request.
    #[serde(default)]
    pub automatic: bool,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
}

/// Listing entry for a snapshot (no stage payloads)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub label: String,
    pub note: Option<String>,
    pub run_title: String,
    pub total_stages: usize,
    pub completed_stages: usize,
    pub automatic: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id.clone(),
            label: s.label.clone(),
            note: s.note.clone(),
            run_title: s.run_title.clone(),
            total_stages: s.total_stages,
            completed_stages: s.completed_stages,
            automatic: s.automatic,
            created_at: s.created_at,
        }
    }
}

/// Derived progress counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub running: usize,
    pub error: usize,
    pub pending: usize,
    /// Participating stages only.
    pub total: usize,
    /// completed / total, rounded to the nearest integer.
    pub percentage: u32,
}

/// Status query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub title: String,
    pub source_url: String,
    pub status: RunStatus,
    pub target_duration: f64,
    pub progress: Progress,
    pub current_stage: Option<String>,
    pub stages: Vec<Stage>,
    pub final_outputs: Option<Value>,
    pub restarted_from: Option<RestartOrigin>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// Run history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub title: String,
    pub status: RunStatus,
    pub completed_stages: usize,
    pub total_stages: usize,
    pub has_error: bool,
    pub percentage: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One synthesized narration clip placed on the final track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSegment {
    pub id: String,
    pub text: String,
    pub audio_path: String,
    /// Offsets in seconds, recomputed from measured durations.
    pub start: f64,
    pub end: f64,
    /// Measured, never estimated.
    pub duration: f64,
    pub speaking_rate: f64,
}
