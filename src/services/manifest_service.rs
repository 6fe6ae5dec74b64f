use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::data::repository;
use crate::error::AppError;
use crate::models::manifest::{ExecutionMode, Manifest, ManifestEntry};
use crate::models::operation::{IntegrityWarning, RevertResult, RevertSkip};
use crate::scope_path;
use crate::services::execute_service::{is_empty_dir, move_file, MoveJournal};

fn lock(db: &Mutex<Connection>) -> std::sync::MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manifest ids owned by a running execution or revert.
///
/// A manifest whose execution died with the process has no owner and can be
/// reverted even though it was never completed.
#[derive(Debug, Default)]
pub struct ManifestLocks {
    held: Mutex<HashSet<String>>,
}

impl ManifestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `Conflict` while another operation holds `manifest_id`.
    pub fn claim(&self, manifest_id: &str) -> Result<ManifestClaim<'_>, AppError> {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !held.insert(manifest_id.to_string()) {
            return Err(AppError::Conflict(format!(
                "manifest {manifest_id} is in use by a running operation"
            )));
        }
        Ok(ManifestClaim {
            locks: self,
            manifest_id: manifest_id.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self, manifest_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(manifest_id)
    }
}

/// Released on drop.
pub struct ManifestClaim<'a> {
    locks: &'a ManifestLocks,
    manifest_id: String,
}

impl Drop for ManifestClaim<'_> {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.manifest_id);
    }
}

/// Writes a manifest incrementally while a real execution runs.
///
/// The header is stored up front and every entry is committed as soon as the
/// move succeeds, so a crash leaves a manifest that can still be reverted.
pub struct ManifestRecorder<'a> {
    db: &'a Mutex<Connection>,
    manifest_id: String,
    hash_size_limit: u64,
    next_seq: usize,
    folders_created: Vec<String>,
}

impl<'a> ManifestRecorder<'a> {
    pub fn begin(
        db: &'a Mutex<Connection>,
        root_path: &str,
        plan_id: Option<&str>,
        hash_size_limit: u64,
    ) -> Result<Self, AppError> {
        let manifest = Manifest {
            id: uuid::Uuid::new_v4().to_string(),
            root_path: root_path.to_string(),
            plan_id: plan_id.map(str::to_string),
            mode: ExecutionMode::Real,
            created_at: Utc::now(),
            completed_at: None,
            folders_created: Vec::new(),
            entries: Vec::new(),
        };
        repository::insert_manifest_header(&lock(db), &manifest)?;
        info!(manifest_id = %manifest.id, root = root_path, "manifest opened");

        Ok(Self {
            db,
            manifest_id: manifest.id,
            hash_size_limit,
            next_seq: 0,
            folders_created: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.manifest_id
    }

    /// Stamps completion. The manifest is immutable afterwards.
    pub fn finish(self) -> Result<String, AppError> {
        repository::complete_manifest(&lock(self.db), &self.manifest_id, Utc::now())?;
        info!(manifest_id = %self.manifest_id, entries = self.next_seq, "manifest completed");
        Ok(self.manifest_id)
    }
}

impl MoveJournal for ManifestRecorder<'_> {
    fn record_move(&mut self, original: &Path, new: &Path) -> Result<(), AppError> {
        let size_bytes = fs::metadata(new).ok().map(|m| m.len());
        let sha256 = hash_file(new, self.hash_size_limit)?;
        let entry = ManifestEntry {
            original_path: original.to_string_lossy().to_string(),
            new_path: new.to_string_lossy().to_string(),
            moved_at: Utc::now(),
            size_bytes,
            sha256,
        };
        repository::insert_manifest_entry(&lock(self.db), &self.manifest_id, self.next_seq, &entry)?;
        self.next_seq += 1;
        Ok(())
    }

    fn record_folder(&mut self, relative: &str) -> Result<(), AppError> {
        self.folders_created.push(relative.to_string());
        repository::update_manifest_folders(&lock(self.db), &self.manifest_id, &self.folders_created)?;
        Ok(())
    }
}

/// SHA-256 of the file, or `None` when it exceeds `size_limit` bytes.
pub fn hash_file(path: &Path, size_limit: u64) -> Result<Option<String>, AppError> {
    let metadata = fs::metadata(path)?;
    if metadata.len() > size_limit {
        return Ok(None);
    }
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(Some(hex::encode(hasher.finalize())))
}

/// Most recent first.
pub fn list(db: &Mutex<Connection>) -> Result<Vec<Manifest>, AppError> {
    repository::list_manifests(&lock(db))
}

pub fn get(db: &Mutex<Connection>, manifest_id: &str) -> Result<Manifest, AppError> {
    repository::get_manifest(&lock(db), manifest_id)?
        .ok_or_else(|| AppError::NotFound(format!("manifest {manifest_id}")))
}

/// Moves every recorded file back, newest move first.
///
/// Entries whose moved file is gone, or whose original location is occupied,
/// are skipped and reported. Content drift since the move is reported as an
/// integrity warning but does not block the revert.
pub fn revert(
    db: &Mutex<Connection>,
    manifest_id: &str,
    hash_size_limit: u64,
) -> Result<RevertResult, AppError> {
    let manifest = get(db, manifest_id)?;
    info!(manifest_id, entries = manifest.entries.len(), "revert started");

    let mut result = RevertResult {
        manifest_id: manifest.id.clone(),
        reverted: 0,
        skipped: Vec::new(),
        integrity_warnings: Vec::new(),
        removed_dirs: Vec::new(),
    };

    for entry in manifest.entries.iter().rev() {
        match revert_entry(entry, hash_size_limit) {
            Ok(warning) => {
                result.reverted += 1;
                if let Some(warning) = warning {
                    warn!(path = %warning.path, "content changed since the move");
                    result.integrity_warnings.push(warning);
                }
            }
            Err(reason) => {
                warn!(new_path = %entry.new_path, %reason, "revert entry skipped");
                result.skipped.push(RevertSkip {
                    original_path: entry.original_path.clone(),
                    new_path: entry.new_path.clone(),
                    reason,
                });
            }
        }
    }

    let root = PathBuf::from(&manifest.root_path);
    let mut folders = manifest.folders_created.clone();
    folders.sort_by(|a, b| {
        scope_path::depth(b)
            .cmp(&scope_path::depth(a))
            .then_with(|| a.cmp(b))
    });
    for relative in folders {
        let path = scope_path::join_relative(&root, &relative);
        if is_empty_dir(&path) && fs::remove_dir(&path).is_ok() {
            result.removed_dirs.push(relative);
        }
    }

    repository::insert_revert(&lock(db), &result)?;
    info!(
        manifest_id,
        reverted = result.reverted,
        skipped = result.skipped.len(),
        "revert finished"
    );
    Ok(result)
}

fn revert_entry(
    entry: &ManifestEntry,
    hash_size_limit: u64,
) -> Result<Option<IntegrityWarning>, String> {
    let new_path = Path::new(&entry.new_path);
    let original_path = Path::new(&entry.original_path);

    if !new_path.is_file() {
        return Err("moved file no longer exists".to_string());
    }
    if fs::symlink_metadata(original_path).is_ok() {
        return Err("original location is occupied".to_string());
    }

    let warning = match &entry.sha256 {
        Some(expected) => match hash_file(new_path, hash_size_limit) {
            Ok(Some(actual)) if &actual != expected => Some(IntegrityWarning {
                path: entry.new_path.clone(),
                expected_sha256: expected.clone(),
                actual_sha256: actual,
            }),
            _ => None,
        },
        None => None,
    };

    if let Some(parent) = original_path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("could not recreate parent: {e}"))?;
    }
    move_file(new_path, original_path).map_err(|e| format!("move back failed: {e}"))?;
    Ok(warning)
}
