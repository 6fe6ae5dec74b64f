use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use crate::config::AppConfig;
use crate::data;
use crate::error::AppError;
use crate::services::advisory_service::{Advisor, CategoryAdvisor};
use crate::services::excerpt_service::ExcerptRegistry;
use crate::services::manifest_service::ManifestLocks;
use crate::services::task_service::TaskRegistry;

pub struct AppState {
    pub db: Mutex<rusqlite::Connection>,
    pub db_path: PathBuf,
    pub config: AppConfig,
    pub tasks: TaskRegistry,
    pub excerpts: ExcerptRegistry,
    pub advisor: Box<dyn Advisor>,
    pub manifest_locks: ManifestLocks,
}

impl AppState {
    /// Opens (and migrates) the database under the configured data dir.
    pub fn open(config: AppConfig) -> Result<Arc<Self>, AppError> {
        Self::with_advisor(config, CategoryAdvisor)
    }

    /// Same as `open`, with a caller-supplied plan advisor.
    pub fn with_advisor(
        config: AppConfig,
        advisor: impl Advisor + 'static,
    ) -> Result<Arc<Self>, AppError> {
        let data_dir = config.resolve_data_dir()?;
        let (conn, db_path) = data::open_database(&data_dir)?;
        info!(db = %db_path.display(), "database ready");

        Ok(Arc::new(Self {
            db: Mutex::new(conn),
            db_path,
            tasks: TaskRegistry::new(config.max_retained_tasks),
            excerpts: ExcerptRegistry::with_plain_text(
                config.excerpt_max_bytes,
                config.excerpt_max_chars,
            ),
            advisor: Box::new(advisor),
            manifest_locks: ManifestLocks::new(),
            config,
        }))
    }

    pub fn db(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.db
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) fn test_state(data_dir: &std::path::Path) -> Arc<AppState> {
    let config = AppConfig {
        data_dir: Some(data_dir.to_path_buf()),
        ..AppConfig::default()
    };
    AppState::open(config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::advisory_service::AdvisoryRequest;
    use serde_json::{json, Value};

    fn test_config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: Some(dir.to_path_buf()),
            ..AppConfig::default()
        }
    }

    struct EmptyAdvisor;

    impl Advisor for EmptyAdvisor {
        fn propose(&self, _request: &AdvisoryRequest) -> Result<Value, AppError> {
            Ok(json!({ "folders": [], "moves": [] }))
        }
    }

    #[test]
    fn open_creates_database_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(test_config(dir.path())).unwrap();

        assert!(state.db_path.starts_with(dir.path()));
        assert!(state.db_path.exists());
        let tables: i64 = state
            .db()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'manifests'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn with_advisor_replaces_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_advisor(test_config(dir.path()), EmptyAdvisor).unwrap();
        let request = AdvisoryRequest {
            root_path: "/".to_string(),
            summary: Default::default(),
            tree: json!({}),
            files: Vec::new(),
            omitted: 0,
            memory: Default::default(),
        };

        let payload = state.advisor.propose(&request).unwrap();
        assert_eq!(payload["moves"], json!([]));
    }

    #[test]
    fn db_survives_poisoned_lock() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(test_config(dir.path())).unwrap();

        let shared = state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.db.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(state.db.is_poisoned());
        let one: i64 = state.db().query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }
}
