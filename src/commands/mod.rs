pub mod execute_commands;
pub mod manifest_commands;
pub mod plan_commands;
pub mod scan_commands;
pub mod snapshot_commands;
pub mod task_commands;

use serde::{Deserialize, Serialize};

/// Returned by every operation that runs as a background task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: String,
}
