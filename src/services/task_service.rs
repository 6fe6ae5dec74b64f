use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::task::{TaskError, TaskKind, TaskResult, TaskSnapshot, TaskStatus};

/// Write side of one task, handed to the work closure.
///
/// Every update goes through the watch channel so subscribers see each state
/// change, and late subscribers get the latest snapshot replayed.
#[derive(Clone)]
pub struct TaskHandle {
    id: String,
    kind: TaskKind,
    sender: Arc<watch::Sender<TaskSnapshot>>,
    cancel: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
}

impl TaskHandle {
    fn new(
        id: String,
        kind: TaskKind,
        root_path: &str,
        sequence: Arc<AtomicU64>,
    ) -> (Self, Arc<watch::Sender<TaskSnapshot>>) {
        let first = sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = TaskSnapshot::pending(id.clone(), kind, root_path.to_string(), first);
        let (sender, _) = watch::channel(snapshot);
        let sender = Arc::new(sender);
        (
            Self {
                id,
                kind,
                sender: sender.clone(),
                cancel: Arc::new(AtomicBool::new(false)),
                sequence,
            },
            sender,
        )
    }

    /// A handle not tracked by any registry, for running services inline.
    pub fn detached(kind: TaskKind, root_path: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self::new(id, kind, root_path, Arc::new(AtomicU64::new(0))).0
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.sender.borrow().clone()
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Fails with `Cancelled` once a stop was requested.
    pub fn checkpoint(&self) -> Result<(), AppError> {
        if self.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(())
    }

    pub fn start(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|snapshot| {
            if snapshot.status != TaskStatus::Pending {
                return false;
            }
            snapshot.status = TaskStatus::Running;
            snapshot.message = message;
            true
        })
    }

    /// Progress is clamped to `[0, 1]` and never moves backwards.
    pub fn progress(&self, fraction: f64, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|snapshot| {
            snapshot.status = TaskStatus::Running;
            snapshot.progress = snapshot.progress.max(fraction.clamp(0.0, 1.0));
            snapshot.message = message;
            true
        })
    }

    pub fn complete(&self, result: TaskResult, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|snapshot| {
            snapshot.status = TaskStatus::Completed;
            snapshot.progress = 1.0;
            snapshot.message = message;
            snapshot.result = Some(result);
            true
        })
    }

    pub fn fail(&self, err: &AppError) -> bool {
        self.update(|snapshot| {
            snapshot.status = TaskStatus::Failed;
            snapshot.message = err.to_string();
            snapshot.error = Some(TaskError::from(err));
            true
        })
    }

    fn update(&self, apply: impl FnOnce(&mut TaskSnapshot) -> bool) -> bool {
        self.sender.send_if_modified(|snapshot| {
            if snapshot.status.is_terminal() || !apply(snapshot) {
                return false;
            }
            snapshot.updated_at = Utc::now();
            snapshot.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            true
        })
    }
}

struct TaskEntry {
    sender: Arc<watch::Sender<TaskSnapshot>>,
    cancel: Arc<AtomicBool>,
    created_order: u64,
    observed: bool,
}

impl TaskEntry {
    fn snapshot(&mut self) -> TaskSnapshot {
        let snapshot = self.sender.borrow().clone();
        if snapshot.status.is_terminal() {
            self.observed = true;
        }
        snapshot
    }
}

/// Thread-safe registry of tasks keyed by id.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    sequence: Arc<AtomicU64>,
    created: AtomicU64,
    max_retained: usize,
}

impl TaskRegistry {
    pub fn new(max_retained: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
            created: AtomicU64::new(0),
            max_retained: max_retained.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a `pending` task and runs `work` on the blocking pool.
    ///
    /// Must be called from within a tokio runtime. Errors and panics inside
    /// `work` both end the task as `failed`.
    pub fn submit<F>(&self, kind: TaskKind, root_path: &str, work: F) -> String
    where
        F: FnOnce(&TaskHandle) -> Result<TaskResult, AppError> + Send + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let (handle, sender) = TaskHandle::new(id.clone(), kind, root_path, self.sequence.clone());

        {
            let mut tasks = self.lock();
            tasks.insert(
                id.clone(),
                TaskEntry {
                    sender,
                    cancel: handle.cancel.clone(),
                    created_order: self.created.fetch_add(1, Ordering::Relaxed),
                    observed: false,
                },
            );
            evict_observed(&mut tasks, self.max_retained);
        }
        info!(task_id = %id, %kind, root = root_path, "task submitted");

        let worker = handle.clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                worker.start(format!("{} running", worker.kind));
                work(&worker)
            })
            .await;

            match outcome {
                Ok(Ok(result)) => {
                    let message = completion_message(handle.kind, &result);
                    info!(task_id = %handle.id, %message, "task completed");
                    handle.complete(result, message);
                }
                Ok(Err(err)) => {
                    warn!(task_id = %handle.id, error = %err, "task failed");
                    handle.fail(&err);
                }
                Err(join_err) => {
                    warn!(task_id = %handle.id, error = %join_err, "task aborted");
                    handle.fail(&AppError::General(format!(
                        "{} task aborted: {join_err}",
                        handle.kind
                    )));
                }
            }
        });

        id
    }

    pub fn get(&self, id: &str) -> Result<TaskSnapshot, AppError> {
        let mut tasks = self.lock();
        tasks
            .get_mut(id)
            .map(TaskEntry::snapshot)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))
    }

    /// All retained tasks, newest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut tasks = self.lock();
        let mut entries: Vec<(u64, TaskSnapshot)> = tasks
            .values_mut()
            .map(|entry| (entry.created_order, entry.snapshot()))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    /// Requests a stop; the task fails with `Cancelled` at its next checkpoint.
    pub fn cancel(&self, id: &str) -> Result<TaskSnapshot, AppError> {
        let mut tasks = self.lock();
        let entry = tasks
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;
        entry.cancel.store(true, Ordering::Relaxed);
        debug!(task_id = id, "cancellation requested");
        Ok(entry.snapshot())
    }

    pub fn subscribe(&self, id: &str) -> Result<watch::Receiver<TaskSnapshot>, AppError> {
        let mut tasks = self.lock();
        let entry = tasks
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;
        entry.snapshot();
        Ok(entry.sender.subscribe())
    }

    /// Resolves once the task reaches a terminal state.
    pub async fn wait(&self, id: &str) -> Result<TaskSnapshot, AppError> {
        let mut receiver = self.subscribe(id)?;
        let snapshot = receiver
            .wait_for(|snapshot| snapshot.status.is_terminal())
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| AppError::NotFound(format!("task {id}")))?;
        self.get(id).ok();
        Ok(snapshot)
    }
}

fn completion_message(kind: TaskKind, result: &TaskResult) -> String {
    match result {
        TaskResult::Execute(execution) if execution.partial => AppError::PartialExecution {
            moved: execution.moved_count,
            skipped: execution.skipped.len(),
        }
        .to_string(),
        TaskResult::Execute(execution) => format!("{} file(s) moved", execution.moved_count),
        TaskResult::Scan { summary, .. } => format!("{} file(s) inventoried", summary.total_files),
        TaskResult::Snapshot { stats, .. } => format!("{} file(s) recorded", stats.total_files),
        _ => format!("{kind} completed"),
    }
}

/// Drops the oldest terminal tasks whose outcome has been read. Pending,
/// running and unread terminal tasks are always kept.
fn evict_observed(tasks: &mut HashMap<String, TaskEntry>, max_retained: usize) {
    if tasks.len() <= max_retained {
        return;
    }
    let mut evictable: Vec<(u64, String)> = tasks
        .iter()
        .filter(|(_, entry)| entry.observed && entry.sender.borrow().status.is_terminal())
        .map(|(id, entry)| (entry.created_order, id.clone()))
        .collect();
    evictable.sort();

    let excess = tasks.len() - max_retained;
    for (_, id) in evictable.into_iter().take(excess) {
        debug!(task_id = %id, "evicting observed task");
        tasks.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::file_record::InventorySummary;
    use std::time::Duration;

    fn scan_result() -> TaskResult {
        TaskResult::Scan {
            inventory_id: "inv".to_string(),
            summary: InventorySummary::default(),
        }
    }

    fn status_rank(status: TaskStatus) -> u8 {
        match status {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let registry = TaskRegistry::new(8);
        assert!(matches!(registry.get("nope"), Err(AppError::NotFound(_))));
        assert!(matches!(registry.cancel("nope"), Err(AppError::NotFound(_))));
        assert!(matches!(registry.subscribe("nope"), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn submitted_task_completes() {
        let registry = TaskRegistry::new(8);
        let id = registry.submit(TaskKind::Scan, "/data", |handle| {
            handle.progress(0.5, "halfway");
            Ok(scan_result())
        });

        let first = registry.get(&id).unwrap();
        assert!(matches!(first.status, TaskStatus::Pending | TaskStatus::Running));

        let done = registry.wait(&id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 1.0);
        assert!(matches!(done.result, Some(TaskResult::Scan { .. })));
        assert!(done.sequence > first.sequence);
    }

    #[tokio::test]
    async fn failing_work_marks_task_failed() {
        let registry = TaskRegistry::new(8);
        let id = registry.submit(TaskKind::Execute, "/data", |_| {
            Err(AppError::InvalidPath("/data is gone".to_string()))
        });

        let done = registry.wait(&id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        let error = done.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidPath);
        assert!(error.message.contains("/data is gone"));
    }

    #[tokio::test]
    async fn panicking_work_marks_task_failed() {
        let registry = TaskRegistry::new(8);
        let id = registry.submit(TaskKind::Plan, "/data", |_| panic!("advisor exploded"));

        let done = registry.wait(&id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.unwrap().kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn cancellation_is_observed_at_checkpoint() {
        let registry = TaskRegistry::new(8);
        let id = registry.submit(TaskKind::Scan, "/data", |handle| {
            for _ in 0..2_000 {
                handle.checkpoint()?;
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(scan_result())
        });
        registry.cancel(&id).unwrap();

        let done = registry.wait(&id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.unwrap().kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn subscribers_see_monotonic_updates() {
        let registry = TaskRegistry::new(8);
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let id = registry.submit(TaskKind::Execute, "/data", move |handle| {
            go_rx.recv().ok();
            for step in 1..=4 {
                handle.progress(step as f64 / 4.0, format!("step {step}"));
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(scan_result())
        });

        let mut receiver = registry.subscribe(&id).unwrap();
        go_tx.send(()).unwrap();

        let mut seen = vec![receiver.borrow_and_update().clone()];
        while !seen.last().unwrap().status.is_terminal() {
            receiver.changed().await.unwrap();
            seen.push(receiver.borrow_and_update().clone());
        }

        for pair in seen.windows(2) {
            assert!(pair[1].sequence > pair[0].sequence);
            assert!(pair[1].progress >= pair[0].progress);
            assert!(status_rank(pair[1].status) >= status_rank(pair[0].status));
        }
        assert_eq!(seen.last().unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn late_subscriber_gets_terminal_snapshot() {
        let registry = TaskRegistry::new(8);
        let id = registry.submit(TaskKind::Scan, "/data", |_| Ok(scan_result()));
        registry.wait(&id).await.unwrap();

        let receiver = registry.subscribe(&id).unwrap();
        assert_eq!(receiver.borrow().status, TaskStatus::Completed);
    }

    #[test]
    fn terminal_state_is_final() {
        let handle = TaskHandle::detached(TaskKind::Scan, "/data");
        assert!(handle.progress(0.6, "scanning"));
        handle.progress(0.2, "still scanning");
        assert_eq!(handle.snapshot().progress, 0.6);
        assert_eq!(handle.snapshot().status, TaskStatus::Running);

        assert!(handle.complete(scan_result(), "done"));
        assert!(!handle.fail(&AppError::Cancelled));
        assert!(!handle.start("again"));
        assert!(!handle.progress(0.9, "late"));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn progress_is_clamped() {
        let handle = TaskHandle::detached(TaskKind::Scan, "/data");
        handle.progress(7.5, "overshoot");
        assert_eq!(handle.snapshot().progress, 1.0);
    }

    #[tokio::test]
    async fn observed_terminal_tasks_are_evicted_first() {
        let registry = TaskRegistry::new(2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = registry.submit(TaskKind::Scan, "/data", |_| Ok(scan_result()));
            registry.wait(&id).await.unwrap();
            ids.push(id);
        }

        let newest = registry.submit(TaskKind::Scan, "/data", |_| Ok(scan_result()));

        assert!(matches!(registry.get(&ids[0]), Err(AppError::NotFound(_))));
        assert!(matches!(registry.get(&ids[1]), Err(AppError::NotFound(_))));
        assert!(registry.get(&ids[2]).is_ok());
        assert!(registry.get(&newest).is_ok());
    }

    #[tokio::test]
    async fn unobserved_terminal_tasks_are_retained() {
        let registry = TaskRegistry::new(1);
        let first = registry.submit(TaskKind::Scan, "/data", |_| Ok(scan_result()));
        let mut receiver = registry.subscribe(&first).unwrap();
        receiver
            .wait_for(|snapshot| snapshot.status.is_terminal())
            .await
            .unwrap();

        let _second = registry.submit(TaskKind::Scan, "/data", |_| Ok(scan_result()));
        assert_eq!(registry.get(&first).unwrap().status, TaskStatus::Completed);
        assert_eq!(registry.list().len(), 2);
    }
}
