use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_stream::Stream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::commands::execute_commands::{self, ExecuteRequest};
use crate::commands::plan_commands::{self, PlanRequest, ProposeRequest};
use crate::commands::scan_commands::{self, StartScanRequest};
use crate::commands::snapshot_commands::{self, CreateSnapshotRequest};
use crate::commands::{manifest_commands, task_commands, TaskAccepted};
use crate::config::AppConfig;
use crate::data::repository::StoredPlan;
use crate::error::{AppError, ErrorKind};
use crate::models::file_record::{Inventory, InventoryHeader};
use crate::models::manifest::Manifest;
use crate::models::operation::RevertResult;
use crate::models::plan::ValidationResult;
use crate::models::snapshot::{Snapshot, SnapshotHeader};
use crate::models::task::TaskSnapshot;
use crate::state::AppState;

// ── Error Handling ──

pub struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidPath => StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Cancelled | ErrorKind::Conflict => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.to_string(),
            "kind": kind,
            "problems": self.0.problems(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Entrypoint ──

pub async fn serve(state: Arc<AppState>, bind: &str, port: u16) -> Result<(), AppError> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("file-organizer listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/scan", post(start_scan))
        .route("/api/scan/{task_id}/results", get(get_scan_results))
        .route("/api/inventories", get(list_inventories))
        .route("/api/inventories/{id}", get(get_inventory))
        .route("/api/plan", post(submit_plan))
        .route("/api/plan/propose", post(propose_plan))
        .route("/api/plan/validate", post(validate_plan))
        .route("/api/plans/{id}", get(get_plan))
        .route("/api/execute", post(execute_plan))
        .route("/api/tasks", get(list_tasks))
        .route("/api/task/{id}", get(get_task))
        .route("/api/task/{id}/cancel", post(cancel_task))
        .route("/api/events/{id}", get(task_events))
        .route("/api/manifests", get(list_manifests))
        .route("/api/manifests/{id}", get(get_manifest))
        .route("/api/manifests/{id}/revert", post(revert_manifest))
        .route("/api/manifests/{id}/reverts", get(manifest_reverts))
        .route("/api/snapshots", get(list_snapshots).post(create_snapshot))
        .route("/api/snapshots/{id}", get(get_snapshot))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    Json(state.config.clone())
}

// ── Scan ──

async fn start_scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartScanRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let accepted = scan_commands::start_scan(&state, request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn get_scan_results(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Inventory> {
    Ok(Json(scan_commands::get_inventory(&state, &task_id)?))
}

async fn list_inventories(State(state): State<Arc<AppState>>) -> ApiResult<Vec<InventoryHeader>> {
    Ok(Json(scan_commands::list_inventories(&state)?))
}

async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Inventory> {
    Ok(Json(scan_commands::get_inventory_by_id(&state, &id)?))
}

// ── Plans ──

async fn submit_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let accepted = plan_commands::submit_plan(&state, request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn propose_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProposeRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let accepted = plan_commands::propose_plan(&state, request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn validate_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> ApiResult<ValidationResult> {
    Ok(Json(plan_commands::validate_plan(&state, request)?))
}

async fn get_plan(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StoredPlan> {
    Ok(Json(plan_commands::get_plan(&state, &id)?))
}

// ── Execution ──

async fn execute_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let accepted = execute_commands::execute_plan(&state, request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

// ── Tasks ──

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskSnapshot>> {
    Json(task_commands::list_tasks(&state))
}

async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<TaskSnapshot> {
    Ok(Json(task_commands::get_task(&state, &id)?))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TaskSnapshot> {
    Ok(Json(task_commands::cancel_task(&state, &id)?))
}

/// Streams `task` events: the current snapshot first, then every change,
/// ending after the terminal one.
async fn task_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut receiver = task_commands::subscribe(&state, &id)?;

    let stream = async_stream::stream! {
        loop {
            let snapshot = receiver.borrow_and_update().clone();
            let terminal = snapshot.status.is_terminal();
            match Event::default().event("task").json_data(&snapshot) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(err) => {
                    warn!(task_id = %snapshot.id, error = %err, "could not encode task event");
                    break;
                }
            }
            if terminal || receiver.changed().await.is_err() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Manifests ──

async fn list_manifests(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Manifest>> {
    Ok(Json(manifest_commands::list_manifests(&state)?))
}

async fn get_manifest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Manifest> {
    Ok(Json(manifest_commands::get_manifest(&state, &id)?))
}

async fn revert_manifest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RevertResult> {
    let result = tokio::task::spawn_blocking(move || manifest_commands::revert(&state, &id))
        .await
        .map_err(|e| AppError::General(format!("revert aborted: {e}")))??;
    Ok(Json(result))
}

async fn manifest_reverts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let reverts = manifest_commands::revert_count(&state, &id)?;
    Ok(Json(json!({ "manifest_id": id, "reverts": reverts })))
}

// ── Snapshots ──

async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSnapshotRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let accepted = snapshot_commands::create_snapshot(&state, request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn list_snapshots(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SnapshotHeader>> {
    Ok(Json(snapshot_commands::list_snapshots(&state)?))
}

async fn get_snapshot(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Snapshot> {
    Ok(Json(snapshot_commands::get_snapshot(&state, &id)?))
}
