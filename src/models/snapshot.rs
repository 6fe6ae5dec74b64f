use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub relative_path: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// Absent for files over the hash limit or that could not be read.
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    /// Keyed like inventory file types; `"(none)"` for files without one.
    pub by_extension: BTreeMap<String, usize>,
}

/// Metadata-only picture of every file under a root at one moment. No
/// content is copied; the hashes let a later comparison spot changed files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub created_at: DateTime<Utc>,
    pub stats: SnapshotStats,
    pub files: Vec<SnapshotFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub created_at: DateTime<Utc>,
    pub stats: SnapshotStats,
}

impl From<&Snapshot> for SnapshotHeader {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            root_path: snapshot.root_path.clone(),
            created_at: snapshot.created_at,
            stats: snapshot.stats.clone(),
        }
    }
}
