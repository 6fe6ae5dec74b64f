use chrono::{DateTime, Utc};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::AppError;
use crate::models::file_record::NO_EXTENSION_KEY;
use crate::models::snapshot::{Snapshot, SnapshotFile, SnapshotStats};
use crate::scope_path;
use crate::services::manifest_service::hash_file;
use crate::services::task_service::TaskHandle;
use crate::shell::safety::validate_root;

const PROGRESS_EVERY: usize = 25;

/// Records path, size, modification time and (below `hash_size_limit`) the
/// SHA-256 of every file under `root_path`. Nothing is pruned and no budget
/// applies; unreadable entries are logged and left out.
pub fn capture(
    root_path: &str,
    name: Option<String>,
    hash_size_limit: u64,
    handle: &TaskHandle,
) -> Result<Snapshot, AppError> {
    let root = validate_root(root_path)?;
    let created_at = Utc::now();
    let name = name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("snapshot_{}", created_at.format("%Y%m%d_%H%M%S")));
    info!(root = %root.display(), %name, "snapshot started");

    let mut files = Vec::new();
    let mut stats = SnapshotStats::default();

    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        handle.checkpoint()?;

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(AppError::InvalidPath(format!("{root_path}: {err}")));
            }
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative_path) = scope_path::relative_to(&root, entry.path()) else {
            continue;
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %relative_path, error = %err, "skipping file without metadata");
                continue;
            }
        };
        let sha256 = match hash_file(entry.path(), hash_size_limit) {
            Ok(digest) => digest,
            Err(err) => {
                warn!(path = %relative_path, error = %err, "could not hash file");
                None
            }
        };

        let extension = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| NO_EXTENSION_KEY.to_string());
        stats.total_files += 1;
        stats.total_size_bytes += metadata.len();
        *stats.by_extension.entry(extension).or_default() += 1;

        files.push(SnapshotFile {
            relative_path,
            size_bytes: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            sha256,
        });

        if files.len() % PROGRESS_EVERY == 0 {
            // The total is unknown up front, so progress only signals liveness.
            handle.progress(0.5, format!("recorded {} file(s)", files.len()));
        }
    }

    info!(
        root = %root.display(),
        files = stats.total_files,
        bytes = stats.total_size_bytes,
        "snapshot finished"
    );
    Ok(Snapshot {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        root_path: root.to_string_lossy().to_string(),
        created_at,
        stats,
        files,
    })
}
