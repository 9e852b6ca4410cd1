// crates/server/src/jobs/types.rs
//! Types for the inventory job system.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Unique identifier for an inventory job.
pub type JobId = uuid::Uuid;

/// Phase of an inventory job.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Validating = 0,
    Building = 1,
    Starting = 2,
    Running = 3,
    Reconciling = 4,
    Completed = 5,
    Failed = 6,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Validating,
            1 => Self::Building,
            2 => Self::Starting,
            3 => Self::Running,
            4 => Self::Reconciling,
            5 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// Point-in-time view of a job, served by `GET /api/jobs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub report_name: String,
    pub phase: JobPhase,
    pub percent: u8,
    pub message: Option<String>,
    /// Most recent log lines, oldest first.
    pub output: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// How a job ended, for metrics and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { files: usize },
    Failed { reason: String },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}
