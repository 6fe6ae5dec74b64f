use std::sync::Arc;

use serde::Deserialize;

use crate::commands::TaskAccepted;
use crate::data::repository;
use crate::error::AppError;
use crate::models::file_record::{Inventory, InventoryHeader};
use crate::models::task::{TaskKind, TaskResult, TaskStatus};
use crate::services::scan_service::{self, ScanOptions};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct StartScanRequest {
    pub path: String,
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub skip_names: Option<Vec<String>>,
}

pub fn start_scan(state: &Arc<AppState>, request: StartScanRequest) -> Result<TaskAccepted, AppError> {
    let options = ScanOptions {
        max_files: state.config.effective_max_files(request.max_files),
        skip_names: request
            .skip_names
            .unwrap_or_else(|| state.config.skip_names.clone()),
    };

    let worker_state = Arc::clone(state);
    let path = request.path.clone();
    let task_id = state.tasks.submit(TaskKind::Scan, &request.path, move |handle| {
        let inventory = scan_service::scan(&path, &options, &worker_state.excerpts, handle)?;
        handle.checkpoint()?;
        repository::insert_inventory(&worker_state.db(), &inventory)?;
        Ok(TaskResult::Scan {
            inventory_id: inventory.id,
            summary: inventory.summary,
        })
    });

    Ok(TaskAccepted { task_id })
}

/// The inventory produced by scan task `task_id`; `NotFound` until the task
/// has completed.
pub fn get_inventory(state: &AppState, task_id: &str) -> Result<Inventory, AppError> {
    let snapshot = state.tasks.get(task_id)?;
    match (snapshot.status, snapshot.result) {
        (TaskStatus::Completed, Some(TaskResult::Scan { inventory_id, .. })) => {
            get_inventory_by_id(state, &inventory_id)
        }
        _ => Err(AppError::NotFound(format!(
            "task {task_id} has no completed scan"
        ))),
    }
}

pub fn list_inventories(state: &AppState) -> Result<Vec<InventoryHeader>, AppError> {
    repository::list_inventories(&state.db())
}

pub fn get_inventory_by_id(state: &AppState, inventory_id: &str) -> Result<Inventory, AppError> {
    repository::get_inventory(&state.db(), inventory_id)?
        .ok_or_else(|| AppError::NotFound(format!("inventory {inventory_id}")))
}
