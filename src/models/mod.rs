pub mod file_record;
pub mod manifest;
pub mod operation;
pub mod plan;
pub mod snapshot;
pub mod task;
