use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_record::InventorySummary;
use super::operation::ExecutionResult;
use super::plan::{Plan, PlanProblem, ValidationResult};
use super::snapshot::SnapshotStats;
use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Scan,
    Plan,
    Execute,
    Snapshot,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Plan => write!(f, "plan"),
            Self::Execute => write!(f, "execute"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<PlanProblem>,
}

impl From<&AppError> for TaskError {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            problems: err.problems().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskResult {
    Scan {
        inventory_id: String,
        summary: InventorySummary,
    },
    Plan {
        plan: Plan,
        validation: ValidationResult,
    },
    Execute(ExecutionResult),
    Snapshot {
        snapshot_id: String,
        stats: SnapshotStats,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: f64,
    pub message: String,
    pub root_path: String,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sequence: u64,
}

impl TaskSnapshot {
    pub fn pending(id: String, kind: TaskKind, root_path: String, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: TaskStatus::Pending,
            progress: 0.0,
            message: format!("{kind} queued"),
            root_path,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            sequence,
        }
    }
}
