pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub(crate) mod scope_path;
pub mod server;
pub mod services;
pub mod shell;
pub mod state;

pub use config::AppConfig;
pub use error::{AppError, ErrorKind};
pub use services::advisory_service::{Advisor, AdvisoryRequest, CategoryAdvisor};
pub use state::AppState;
