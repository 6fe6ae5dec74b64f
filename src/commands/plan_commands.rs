use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::commands::TaskAccepted;
use crate::data::repository::{self, StoredPlan};
use crate::error::AppError;
use crate::models::file_record::Inventory;
use crate::models::plan::{Plan, ValidationResult};
use crate::models::task::{TaskKind, TaskResult};
use crate::services::advisory_service::{self, OrganizationMemory};
use crate::services::plan_service;
use crate::shell::safety::validate_root;
use crate::state::AppState;

/// How many earlier plans for a root feed the organization memory.
const MEMORY_PLAN_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub path: String,
    pub plan: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposeRequest {
    pub path: String,
}

/// Canonical root plus the most recent inventory scanned for it.
pub(crate) fn latest_scan(state: &AppState, path: &str) -> Result<(PathBuf, Inventory), AppError> {
    let root = validate_root(path)?;
    let root_str = root.to_string_lossy().to_string();
    let inventory = repository::latest_inventory_for_root(&state.db(), &root_str)?
        .ok_or_else(|| {
            AppError::NotFound(format!("no inventory for {root_str}; scan it first"))
        })?;
    Ok((root, inventory))
}

/// Validates `plan` and persists it unless a problem blocks execution.
fn check_and_store(
    state: &AppState,
    root: &Path,
    inventory: &Inventory,
    plan: Plan,
) -> Result<TaskResult, AppError> {
    let validation = plan_service::validate(&plan, inventory, root);
    if !validation.blocking_problems().is_empty() {
        return Err(AppError::ValidationFailed(validation.problems));
    }

    repository::insert_plan(
        &state.db(),
        &StoredPlan {
            plan: plan.clone(),
            root_path: inventory.root_path.clone(),
            inventory_id: Some(inventory.id.clone()),
            validation: validation.clone(),
        },
    )?;
    info!(plan_id = %plan.id, moves = plan.moves.len(), ok = validation.ok, "plan stored");
    Ok(TaskResult::Plan { plan, validation })
}

pub fn submit_plan(state: &Arc<AppState>, request: PlanRequest) -> Result<TaskAccepted, AppError> {
    let worker_state = Arc::clone(state);
    let PlanRequest { path, plan } = request;
    let task_id = state.tasks.submit(TaskKind::Plan, &path.clone(), move |handle| {
        let plan = Plan::from_untrusted(&plan)?;
        let (root, inventory) = latest_scan(&worker_state, &path)?;
        handle.progress(0.5, "validating plan");
        check_and_store(&worker_state, &root, &inventory, plan)
    });
    Ok(TaskAccepted { task_id })
}

/// Asks the configured advisor for a plan, then handles it like a submitted one.
pub fn propose_plan(state: &Arc<AppState>, request: ProposeRequest) -> Result<TaskAccepted, AppError> {
    let worker_state = Arc::clone(state);
    let path = request.path;
    let task_id = state.tasks.submit(TaskKind::Plan, &path.clone(), move |handle| {
        let (root, inventory) = latest_scan(&worker_state, &path)?;
        let memory = organization_memory(&worker_state, &inventory.root_path)?;
        let advisory = advisory_service::build_request(
            &inventory,
            worker_state.config.advisory_max_files,
            memory,
        );
        handle.progress(0.2, format!("proposing moves for {} file(s)", advisory.files.len()));
        let payload = worker_state.advisor.propose(&advisory)?;
        handle.checkpoint()?;

        let plan = Plan::from_untrusted(&payload)?;
        handle.progress(0.7, "validating plan");
        check_and_store(&worker_state, &root, &inventory, plan)
    });
    Ok(TaskAccepted { task_id })
}

/// Folder patterns from the plans previously stored for `root_path`.
pub fn organization_memory(state: &AppState, root_path: &str) -> Result<OrganizationMemory, AppError> {
    let stored = repository::list_plans_for_root(&state.db(), root_path, MEMORY_PLAN_LIMIT)?;
    Ok(OrganizationMemory::from_plans(stored.iter().map(|stored| &stored.plan)))
}

/// Synchronous dry check; a malformed payload is reported as a failed
/// validation rather than an error.
pub fn validate_plan(state: &AppState, request: PlanRequest) -> Result<ValidationResult, AppError> {
    let (root, inventory) = latest_scan(state, &request.path)?;
    match Plan::from_untrusted(&request.plan) {
        Ok(plan) => Ok(plan_service::validate(&plan, &inventory, &root)),
        Err(AppError::ValidationFailed(problems)) => Ok(ValidationResult::from_problems(problems)),
        Err(err) => Err(err),
    }
}

pub fn get_plan(state: &AppState, plan_id: &str) -> Result<StoredPlan, AppError> {
    repository::get_plan(&state.db(), plan_id)?
        .ok_or_else(|| AppError::NotFound(format!("plan {plan_id}")))
}
