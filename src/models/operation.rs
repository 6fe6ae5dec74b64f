use serde::{Deserialize, Serialize};

use super::manifest::ExecutionMode;

/// What happened (or would happen) to one move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub index: usize,
    pub source: String,
    pub planned_destination: String,
    pub destination: String,
    /// True when a numeric suffix was applied to avoid a collision.
    pub renamed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMove {
    pub index: Option<usize>,
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub manifest_id: Option<String>,
    pub mode: ExecutionMode,
    pub moved_count: usize,
    pub outcomes: Vec<MoveOutcome>,
    pub skipped: Vec<SkippedMove>,
    pub folders_created: Vec<String>,
    pub removed_dirs: Vec<String>,
    pub partial: bool,
}

impl ExecutionResult {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            manifest_id: None,
            mode,
            moved_count: 0,
            outcomes: Vec::new(),
            skipped: Vec::new(),
            folders_created: Vec::new(),
            removed_dirs: Vec::new(),
            partial: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertSkip {
    pub original_path: String,
    pub new_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    pub path: String,
    pub expected_sha256: String,
    pub actual_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertResult {
    pub manifest_id: String,
    pub reverted: usize,
    pub skipped: Vec<RevertSkip>,
    pub integrity_warnings: Vec<IntegrityWarning>,
    pub removed_dirs: Vec<String>,
}
