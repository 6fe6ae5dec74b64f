use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Real,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry_run"),
            Self::Real => write!(f, "real"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry_run" => Ok(Self::DryRun),
            "real" => Ok(Self::Real),
            _ => Err(format!("unknown execution mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original_path: String,
    pub new_path: String,
    pub moved_at: DateTime<Utc>,
    pub size_bytes: Option<u64>,
    /// Content digest taken after the move, absent for files over the hash limit.
    pub sha256: Option<String>,
}

/// Durable record of the moves one real execution performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub root_path: String,
    pub plan_id: Option<String>,
    pub mode: ExecutionMode,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub folders_created: Vec<String>,
    pub entries: Vec<ManifestEntry>,
}
