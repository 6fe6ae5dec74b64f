use std::sync::Arc;

use serde::Deserialize;

use crate::commands::TaskAccepted;
use crate::data::repository;
use crate::error::AppError;
use crate::models::snapshot::{Snapshot, SnapshotHeader};
use crate::models::task::{TaskKind, TaskResult};
use crate::services::snapshot_service;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSnapshotRequest {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub fn create_snapshot(
    state: &Arc<AppState>,
    request: CreateSnapshotRequest,
) -> Result<TaskAccepted, AppError> {
    let worker_state = Arc::clone(state);
    let CreateSnapshotRequest { path, name } = request;
    let task_id = state.tasks.submit(TaskKind::Snapshot, &path.clone(), move |handle| {
        let snapshot = snapshot_service::capture(
            &path,
            name,
            worker_state.config.hash_size_limit,
            handle,
        )?;
        handle.checkpoint()?;
        repository::insert_snapshot(&worker_state.db(), &snapshot)?;
        Ok(TaskResult::Snapshot {
            snapshot_id: snapshot.id,
            stats: snapshot.stats,
        })
    });
    Ok(TaskAccepted { task_id })
}

pub fn list_snapshots(state: &AppState) -> Result<Vec<SnapshotHeader>, AppError> {
    repository::list_snapshots(&state.db())
}

pub fn get_snapshot(state: &AppState, snapshot_id: &str) -> Result<Snapshot, AppError> {
    repository::get_snapshot(&state.db(), snapshot_id)?
        .ok_or_else(|| AppError::NotFound(format!("snapshot {snapshot_id}")))
}
