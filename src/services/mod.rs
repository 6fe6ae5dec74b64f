pub mod advisory_service;
pub mod excerpt_service;
pub mod execute_service;
pub mod manifest_service;
pub mod plan_service;
pub mod scan_service;
pub mod snapshot_service;
pub mod task_service;
