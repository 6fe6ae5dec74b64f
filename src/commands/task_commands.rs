use tokio::sync::watch;

use crate::error::AppError;
use crate::models::task::TaskSnapshot;
use crate::state::AppState;

pub fn get_task(state: &AppState, task_id: &str) -> Result<TaskSnapshot, AppError> {
    state.tasks.get(task_id)
}

pub fn list_tasks(state: &AppState) -> Vec<TaskSnapshot> {
    state.tasks.list()
}

pub fn cancel_task(state: &AppState, task_id: &str) -> Result<TaskSnapshot, AppError> {
    state.tasks.cancel(task_id)
}

/// Receiver that starts at the latest snapshot and sees every later update.
pub fn subscribe(state: &AppState, task_id: &str) -> Result<watch::Receiver<TaskSnapshot>, AppError> {
    state.tasks.subscribe(task_id)
}
