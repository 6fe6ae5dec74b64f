use serde::Serialize;

use crate::models::plan::PlanProblem;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("plan failed validation with {} problem(s)", .0.len())]
    ValidationFailed(Vec<PlanProblem>),

    #[error("execution partially applied: {moved} moved, {skipped} skipped")]
    PartialExecution { moved: usize, skipped: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    General(String),
}

/// Stable, client-facing classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidPath,
    ValidationFailed,
    PartialExecution,
    IoFailure,
    Cancelled,
    Conflict,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::PartialExecution { .. } => ErrorKind::PartialExecution,
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Database(_) | Self::Serde(_) | Self::Config(_) | Self::General(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn problems(&self) -> &[PlanProblem] {
        match self {
            Self::ValidationFailed(problems) => problems,
            _ => &[],
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
