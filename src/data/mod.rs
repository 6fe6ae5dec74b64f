pub mod migrations;
pub mod repository;

use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const DATABASE_FILE: &str = "file-organizer.db";

/// Opens (creating if needed) the store under `data_dir` and migrates it.
pub fn open_database(data_dir: &Path) -> Result<(rusqlite::Connection, PathBuf), AppError> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(DATABASE_FILE);
    let conn = rusqlite::Connection::open(&db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrations::run_migrations(&conn)?;
    Ok((conn, db_path))
}
