use crate::data::repository;
use crate::error::AppError;
use crate::models::manifest::Manifest;
use crate::models::operation::RevertResult;
use crate::services::manifest_service;
use crate::state::AppState;

pub fn list_manifests(state: &AppState) -> Result<Vec<Manifest>, AppError> {
    manifest_service::list(&state.db)
}

pub fn get_manifest(state: &AppState, manifest_id: &str) -> Result<Manifest, AppError> {
    manifest_service::get(&state.db, manifest_id)
}

/// Blocking; callers on the async runtime should move this onto the blocking pool.
///
/// Fails with `Conflict` while an execution is still writing the manifest or
/// another revert of it is running.
pub fn revert(state: &AppState, manifest_id: &str) -> Result<RevertResult, AppError> {
    let _claim = state.manifest_locks.claim(manifest_id)?;
    manifest_service::revert(&state.db, manifest_id, state.config.hash_size_limit)
}

/// Number of times a manifest has been reverted.
pub fn revert_count(state: &AppState, manifest_id: &str) -> Result<usize, AppError> {
    manifest_service::get(&state.db, manifest_id)?;
    repository::count_reverts(&state.db(), manifest_id)
}
