use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::commands::plan_commands::latest_scan;
use crate::commands::TaskAccepted;
use crate::error::AppError;
use crate::models::plan::{Plan, PlanProblem, ProblemCode};
use crate::models::task::{TaskKind, TaskResult};
use crate::services::execute_service::{self, ExecuteOptions};
use crate::services::manifest_service::ManifestRecorder;
use crate::services::plan_service;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub path: String,
    /// Inline plan payload; takes precedence over `plan_id`.
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub cleanup_empty_dirs: Option<bool>,
}

enum PlanSource {
    Inline(Value),
    Stored(String),
}

pub fn execute_plan(state: &Arc<AppState>, request: ExecuteRequest) -> Result<TaskAccepted, AppError> {
    let source = match (request.plan, request.plan_id) {
        (Some(payload), _) => PlanSource::Inline(payload),
        (None, Some(plan_id)) => PlanSource::Stored(plan_id),
        (None, None) => {
            return Err(AppError::ValidationFailed(vec![PlanProblem::for_plan(
                ProblemCode::MalformedPayload,
                "either `plan` or `plan_id` is required",
            )]))
        }
    };
    let options = ExecuteOptions {
        cleanup_empty_dirs: request
            .cleanup_empty_dirs
            .unwrap_or(state.config.cleanup_empty_dirs),
    };
    let dry_run = request.dry_run;
    let path = request.path;

    let worker_state = Arc::clone(state);
    let task_id = state.tasks.submit(TaskKind::Execute, &path.clone(), move |handle| {
        let state = worker_state;
        let (root, inventory) = latest_scan(&state, &path)?;
        let root_str = root.to_string_lossy().to_string();

        let (plan, stored_id) = match source {
            PlanSource::Inline(payload) => (Plan::from_untrusted(&payload)?, None),
            PlanSource::Stored(plan_id) => {
                let stored = super::plan_commands::get_plan(&state, &plan_id)?;
                if stored.root_path != root_str {
                    return Err(AppError::InvalidPath(format!(
                        "plan {plan_id} was made for {}",
                        stored.root_path
                    )));
                }
                (stored.plan, Some(plan_id))
            }
        };

        let validation = plan_service::validate(&plan, &inventory, &root);
        if !validation.blocking_problems().is_empty() {
            return Err(AppError::ValidationFailed(validation.problems));
        }
        let protected = inventory.protected_sources();
        handle.checkpoint()?;

        if dry_run {
            let result = execute_service::simulate(&root, &plan, &protected, handle)?;
            return Ok(TaskResult::Execute(result));
        }

        let mut recorder = ManifestRecorder::begin(
            &state.db,
            &root_str,
            stored_id.as_deref(),
            state.config.hash_size_limit,
        )?;
        // Held until the manifest is completed; revert refuses it meanwhile.
        let _claim = state.manifest_locks.claim(recorder.id())?;
        let outcome =
            execute_service::apply(&root, &plan, &protected, &mut recorder, &options, handle);
        // Moves that already happened stay revertable even when the run stopped early.
        let manifest_id = recorder.finish()?;

        match outcome {
            Ok(mut result) => {
                info!(%manifest_id, moved = result.moved_count, skipped = result.skipped.len(), "plan applied");
                result.manifest_id = Some(manifest_id);
                Ok(TaskResult::Execute(result))
            }
            Err(err) => {
                warn!(%manifest_id, error = %err, "execution stopped early");
                Err(err)
            }
        }
    });

    Ok(TaskAccepted { task_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::manifest_commands;
    use crate::commands::scan_commands::{self, StartScanRequest};
    use crate::error::ErrorKind;
    use crate::models::manifest::ExecutionMode;
    use crate::models::task::{TaskSnapshot, TaskStatus};
    use crate::state::test_state;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    async fn scanned(state: &Arc<AppState>, root: &Path) {
        let accepted = scan_commands::start_scan(
            state,
            StartScanRequest {
                path: root.to_string_lossy().to_string(),
                max_files: None,
                skip_names: None,
            },
        )
        .unwrap();
        state.tasks.wait(&accepted.task_id).await.unwrap();
    }

    fn request(root: &Path, plan: Value, dry_run: bool) -> ExecuteRequest {
        ExecuteRequest {
            path: root.to_string_lossy().to_string(),
            plan: Some(plan),
            plan_id: None,
            dry_run,
            cleanup_empty_dirs: None,
        }
    }

    async fn run(state: &Arc<AppState>, request: ExecuteRequest) -> TaskSnapshot {
        let accepted = execute_plan(state, request).unwrap();
        state.tasks.wait(&accepted.task_id).await.unwrap()
    }

    fn execution(snapshot: TaskSnapshot) -> crate::models::operation::ExecutionResult {
        match snapshot.result {
            Some(TaskResult::Execute(result)) => result,
            other => panic!("expected execution result, got {other:?} / {:?}", snapshot.error),
        }
    }

    #[tokio::test]
    async fn dry_run_matches_real_run_and_leaves_files_alone() {
        let data = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("Docs")).unwrap();
        fs::write(root.path().join("Docs/report.pdf"), "existing").unwrap();
        fs::create_dir_all(root.path().join("inbox")).unwrap();
        fs::write(root.path().join("inbox/report.pdf"), "incoming").unwrap();
        let state = test_state(data.path());
        scanned(&state, root.path()).await;

        let plan = json!({
            "folders": ["Docs"],
            "moves": [{"source": "inbox/report.pdf", "destination": "Docs/report.pdf"}]
        });

        let dry = execution(run(&state, request(root.path(), plan.clone(), true)).await);
        assert_eq!(dry.mode, ExecutionMode::DryRun);
        assert_eq!(dry.manifest_id, None);
        assert!(root.path().join("inbox/report.pdf").exists());
        assert!(!root.path().join("Docs/report_1.pdf").exists());

        let real = execution(run(&state, request(root.path(), plan, false)).await);
        assert_eq!(real.moved_count, dry.moved_count);
        assert_eq!(real.outcomes, dry.outcomes);
        assert!(real.outcomes[0].renamed);
        assert_eq!(
            fs::read_to_string(root.path().join("Docs/report_1.pdf")).unwrap(),
            "incoming"
        );
        assert_eq!(
            fs::read_to_string(root.path().join("Docs/report.pdf")).unwrap(),
            "existing"
        );
        assert!(real.removed_dirs.contains(&"inbox".to_string()));
    }

    #[tokio::test]
    async fn real_run_can_be_reverted() {
        let data = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "alpha").unwrap();
        fs::write(root.path().join("b.txt"), "beta").unwrap();
        let state = test_state(data.path());
        scanned(&state, root.path()).await;

        let plan = json!({
            "folders": ["Text/Notes"],
            "moves": [
                {"source": "a.txt", "destination": "Text/Notes/a.txt"},
                {"source": "b.txt", "destination": "Text/b.txt"}
            ]
        });
        let result = execution(run(&state, request(root.path(), plan, false)).await);
        assert_eq!(result.moved_count, 2);
        assert!(!root.path().join("a.txt").exists());

        let manifest_id = result.manifest_id.unwrap();
        let manifest = manifest_commands::get_manifest(&state, &manifest_id).unwrap();
        assert_eq!(manifest.entries.len(), 2);
        assert!(manifest.completed_at.is_some());

        let reverted = manifest_commands::revert(&state, &manifest_id).unwrap();
        assert_eq!(reverted.reverted, 2);
        assert_eq!(fs::read_to_string(root.path().join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(root.path().join("b.txt")).unwrap(), "beta");
        assert!(!root.path().join("Text").exists());
    }

    #[tokio::test]
    async fn stored_plans_execute_by_id() {
        let data = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "alpha").unwrap();
        let state = test_state(data.path());
        scanned(&state, root.path()).await;

        let accepted = crate::commands::plan_commands::submit_plan(
            &state,
            crate::commands::plan_commands::PlanRequest {
                path: root.path().to_string_lossy().to_string(),
                plan: json!({"folders": ["Docs"], "moves": [{"source": "a.txt", "destination": "Docs/a.txt"}]}),
            },
        )
        .unwrap();
        let planned = state.tasks.wait(&accepted.task_id).await.unwrap();
        let Some(TaskResult::Plan { plan, .. }) = planned.result else {
            panic!("expected plan");
        };

        let snapshot = run(
            &state,
            ExecuteRequest {
                path: root.path().to_string_lossy().to_string(),
                plan: None,
                plan_id: Some(plan.id.clone()),
                dry_run: false,
                cleanup_empty_dirs: None,
            },
        )
        .await;
        let result = execution(snapshot);
        let manifest =
            manifest_commands::get_manifest(&state, result.manifest_id.as_deref().unwrap()).unwrap();
        assert_eq!(manifest.plan_id.as_deref(), Some(plan.id.as_str()));
        assert!(root.path().join("Docs/a.txt").exists());
    }

    #[tokio::test]
    async fn escaping_plan_fails_without_touching_files() {
        let data = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "alpha").unwrap();
        let state = test_state(data.path());
        scanned(&state, root.path()).await;

        let plan = json!({"moves": [{"source": "a.txt", "destination": "../a.txt"}]});
        let snapshot = run(&state, request(root.path(), plan, false)).await;

        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.unwrap().kind, ErrorKind::ValidationFailed);
        assert!(root.path().join("a.txt").exists());
        assert!(manifest_commands::list_manifests(&state).unwrap().is_empty());
    }

    #[tokio::test]
    async fn plans_the_executor_would_skip_are_refused() {
        let data = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "alpha").unwrap();
        fs::write(root.path().join("Docs"), "not a folder").unwrap();
        let state = test_state(data.path());
        scanned(&state, root.path()).await;

        for plan in [
            json!({"moves": [
                {"source": "a.txt", "destination": "One/a.txt"},
                {"source": "a.txt", "destination": "Two/a.txt"}
            ], "folders": ["One", "Two"]}),
            json!({"moves": [{"source": "a.txt", "destination": "a.txt"}]}),
            json!({"folders": ["Docs"], "moves": [{"source": "a.txt", "destination": "Docs/a.txt"}]}),
        ] {
            let snapshot = run(&state, request(root.path(), plan, false)).await;
            assert_eq!(snapshot.status, TaskStatus::Failed);
            assert_eq!(snapshot.error.unwrap().kind, ErrorKind::ValidationFailed);
        }
        assert_eq!(fs::read_to_string(root.path().join("a.txt")).unwrap(), "alpha");
        assert!(!root.path().join("One").exists());
        assert!(manifest_commands::list_manifests(&state).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_plan_is_rejected_up_front() {
        let data = tempfile::tempdir().unwrap();
        let state = test_state(data.path());

        let err = execute_plan(
            &state,
            ExecuteRequest {
                path: "/tmp".to_string(),
                plan: None,
                plan_id: None,
                dry_run: true,
                cleanup_empty_dirs: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }
}
