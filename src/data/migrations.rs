use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS inventories (
    id TEXT PRIMARY KEY NOT NULL,
    root_path TEXT NOT NULL,
    summary TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inventories_root ON inventories(root_path, created_at DESC);

CREATE TABLE IF NOT EXISTS inventory_files (
    inventory_id TEXT NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    path TEXT NOT NULL,
    relative_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    extension TEXT,
    category TEXT NOT NULL,
    created_at TEXT,
    modified_at TEXT,
    excerpt TEXT,
    inside_organized_region BOOLEAN NOT NULL DEFAULT 0,
    PRIMARY KEY (inventory_id, position)
);

CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY NOT NULL,
    root_path TEXT NOT NULL,
    inventory_id TEXT,
    folders TEXT NOT NULL,
    moves TEXT NOT NULL,
    validation TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS manifests (
    id TEXT PRIMARY KEY NOT NULL,
    root_path TEXT NOT NULL,
    plan_id TEXT,
    mode TEXT NOT NULL,
    folders_created TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_manifests_created ON manifests(created_at DESC);

CREATE TABLE IF NOT EXISTS manifest_entries (
    manifest_id TEXT NOT NULL REFERENCES manifests(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    original_path TEXT NOT NULL,
    new_path TEXT NOT NULL,
    moved_at TEXT NOT NULL,
    size_bytes INTEGER,
    sha256 TEXT,
    PRIMARY KEY (manifest_id, seq)
);

CREATE TABLE IF NOT EXISTS manifest_reverts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    manifest_id TEXT NOT NULL REFERENCES manifests(id) ON DELETE CASCADE,
    reverted_count INTEGER NOT NULL,
    skipped_count INTEGER NOT NULL,
    result TEXT NOT NULL,
    reverted_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    root_path TEXT NOT NULL,
    stats TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_files (
    snapshot_id TEXT NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    relative_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    modified_at TEXT,
    sha256 TEXT,
    PRIMARY KEY (snapshot_id, position)
);
";

pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(SCHEMA_V1)?;
    Ok(())
}
