use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::file_record::{FileCategory, FileRecord, Inventory, InventoryHeader};
use crate::models::manifest::{ExecutionMode, Manifest, ManifestEntry};
use crate::models::operation::RevertResult;
use crate::models::plan::{Plan, ValidationResult};
use crate::models::snapshot::{Snapshot, SnapshotFile, SnapshotHeader};

/// A validated plan together with the scan it was checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
    pub plan: Plan,
    pub root_path: String,
    pub inventory_id: Option<String>,
    pub validation: ValidationResult,
}

pub fn insert_inventory(conn: &Connection, inventory: &Inventory) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO inventories (id, root_path, summary, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            inventory.id,
            inventory.root_path,
            serde_json::to_string(&inventory.summary)?,
            inventory.created_at,
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO inventory_files (inventory_id, position, path, relative_path, size_bytes, extension, category, created_at, modified_at, excerpt, inside_organized_region)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for (position, file) in inventory.files.iter().enumerate() {
            stmt.execute(params![
                inventory.id,
                position as i64,
                file.path,
                file.relative_path,
                file.size_bytes as i64,
                file.extension,
                file.category.as_str(),
                file.created_at,
                file.modified_at,
                file.excerpt,
                file.inside_organized_region,
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

fn inventory_header_from_row(row: &Row<'_>) -> Result<(InventoryHeader, String), rusqlite::Error> {
    let summary: String = row.get(2)?;
    Ok((
        InventoryHeader {
            id: row.get(0)?,
            root_path: row.get(1)?,
            summary: Default::default(),
            created_at: row.get(3)?,
        },
        summary,
    ))
}

fn decode_header((mut header, summary): (InventoryHeader, String)) -> Result<InventoryHeader, AppError> {
    header.summary = serde_json::from_str(&summary)?;
    Ok(header)
}

pub fn get_inventory(conn: &Connection, id: &str) -> Result<Option<Inventory>, AppError> {
    let header = conn
        .query_row(
            "SELECT id, root_path, summary, created_at FROM inventories WHERE id = ?1",
            params![id],
            inventory_header_from_row,
        )
        .optional()?;
    let Some(raw) = header else {
        return Ok(None);
    };
    let header = decode_header(raw)?;

    let mut stmt = conn.prepare(
        "SELECT path, relative_path, size_bytes, extension, category, created_at, modified_at, excerpt, inside_organized_region
         FROM inventory_files WHERE inventory_id = ?1 ORDER BY position ASC",
    )?;
    let files = stmt
        .query_map(params![id], |row| {
            let size: i64 = row.get(2)?;
            let category: String = row.get(4)?;
            Ok(FileRecord {
                path: row.get(0)?,
                relative_path: row.get(1)?,
                size_bytes: size.max(0) as u64,
                extension: row.get(3)?,
                category: category.parse().unwrap_or(FileCategory::Other),
                created_at: row.get(5)?,
                modified_at: row.get(6)?,
                excerpt: row.get(7)?,
                inside_organized_region: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Inventory {
        id: header.id,
        root_path: header.root_path,
        files,
        summary: header.summary,
        created_at: header.created_at,
    }))
}

pub fn latest_inventory_for_root(
    conn: &Connection,
    root_path: &str,
) -> Result<Option<Inventory>, AppError> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM inventories WHERE root_path = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            params![root_path],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => get_inventory(conn, &id),
        None => Ok(None),
    }
}

pub fn list_inventories(conn: &Connection) -> Result<Vec<InventoryHeader>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, root_path, summary, created_at FROM inventories ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([], inventory_header_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_header).collect()
}

pub fn insert_plan(conn: &Connection, stored: &StoredPlan) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO plans (id, root_path, inventory_id, folders, moves, validation, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            stored.plan.id,
            stored.root_path,
            stored.inventory_id,
            serde_json::to_string(&stored.plan.folders)?,
            serde_json::to_string(&stored.plan.moves)?,
            serde_json::to_string(&stored.validation)?,
            stored.plan.created_at,
        ],
    )?;
    Ok(())
}

const PLAN_COLUMNS: &str = "id, root_path, inventory_id, folders, moves, validation, created_at";

type PlanRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    DateTime<Utc>,
);

fn plan_from_row(row: &Row<'_>) -> Result<PlanRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_plan(
    (id, root_path, inventory_id, folders, moves, validation, created_at): PlanRow,
) -> Result<StoredPlan, AppError> {
    Ok(StoredPlan {
        plan: Plan {
            id,
            folders: serde_json::from_str(&folders)?,
            moves: serde_json::from_str(&moves)?,
            created_at,
        },
        root_path,
        inventory_id,
        validation: serde_json::from_str(&validation)?,
    })
}

pub fn get_plan(conn: &Connection, id: &str) -> Result<Option<StoredPlan>, AppError> {
    let row = conn
        .query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
            params![id],
            plan_from_row,
        )
        .optional()?;
    row.map(decode_plan).transpose()
}

/// Plans stored for `root_path`, newest first.
pub fn list_plans_for_root(
    conn: &Connection,
    root_path: &str,
    limit: usize,
) -> Result<Vec<StoredPlan>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAN_COLUMNS} FROM plans WHERE root_path = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![root_path, limit as i64], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_plan).collect()
}

pub fn insert_manifest_header(conn: &Connection, manifest: &Manifest) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO manifests (id, root_path, plan_id, mode, folders_created, created_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            manifest.id,
            manifest.root_path,
            manifest.plan_id,
            manifest.mode.to_string(),
            serde_json::to_string(&manifest.folders_created)?,
            manifest.created_at,
            manifest.completed_at,
        ],
    )?;
    Ok(())
}

pub fn insert_manifest_entry(
    conn: &Connection,
    manifest_id: &str,
    seq: usize,
    entry: &ManifestEntry,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO manifest_entries (manifest_id, seq, original_path, new_path, moved_at, size_bytes, sha256)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            manifest_id,
            seq as i64,
            entry.original_path,
            entry.new_path,
            entry.moved_at,
            entry.size_bytes.map(|size| size as i64),
            entry.sha256,
        ],
    )?;
    Ok(())
}

pub fn update_manifest_folders(
    conn: &Connection,
    manifest_id: &str,
    folders: &[String],
) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE manifests SET folders_created = ?2 WHERE id = ?1",
        params![manifest_id, serde_json::to_string(folders)?],
    )?;
    Ok(count)
}

pub fn complete_manifest(
    conn: &Connection,
    manifest_id: &str,
    completed_at: DateTime<Utc>,
) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE manifests SET completed_at = ?2 WHERE id = ?1 AND completed_at IS NULL",
        params![manifest_id, completed_at],
    )?;
    Ok(count)
}

fn manifest_entries(conn: &Connection, manifest_id: &str) -> Result<Vec<ManifestEntry>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT original_path, new_path, moved_at, size_bytes, sha256
         FROM manifest_entries WHERE manifest_id = ?1 ORDER BY seq ASC",
    )?;
    let entries = stmt
        .query_map(params![manifest_id], |row| {
            let size: Option<i64> = row.get(3)?;
            Ok(ManifestEntry {
                original_path: row.get(0)?,
                new_path: row.get(1)?,
                moved_at: row.get(2)?,
                size_bytes: size.map(|s| s.max(0) as u64),
                sha256: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

const MANIFEST_COLUMNS: &str =
    "id, root_path, plan_id, mode, folders_created, created_at, completed_at";

fn manifest_from_row(row: &Row<'_>) -> Result<(Manifest, String), rusqlite::Error> {
    let mode: String = row.get(3)?;
    let folders: String = row.get(4)?;
    Ok((
        Manifest {
            id: row.get(0)?,
            root_path: row.get(1)?,
            plan_id: row.get(2)?,
            mode: mode.parse().unwrap_or(ExecutionMode::Real),
            created_at: row.get(5)?,
            completed_at: row.get(6)?,
            folders_created: Vec::new(),
            entries: Vec::new(),
        },
        folders,
    ))
}

fn hydrate_manifest(conn: &Connection, (mut manifest, folders): (Manifest, String)) -> Result<Manifest, AppError> {
    manifest.folders_created = serde_json::from_str(&folders)?;
    manifest.entries = manifest_entries(conn, &manifest.id)?;
    Ok(manifest)
}

pub fn get_manifest(conn: &Connection, id: &str) -> Result<Option<Manifest>, AppError> {
    let row = conn
        .query_row(
            &format!("SELECT {MANIFEST_COLUMNS} FROM manifests WHERE id = ?1"),
            params![id],
            manifest_from_row,
        )
        .optional()?;
    row.map(|raw| hydrate_manifest(conn, raw)).transpose()
}

pub fn list_manifests(conn: &Connection) -> Result<Vec<Manifest>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MANIFEST_COLUMNS} FROM manifests ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map([], manifest_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|raw| hydrate_manifest(conn, raw))
        .collect()
}

pub fn insert_revert(conn: &Connection, result: &RevertResult) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO manifest_reverts (manifest_id, reverted_count, skipped_count, result)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            result.manifest_id,
            result.reverted as i64,
            result.skipped.len() as i64,
            serde_json::to_string(result)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_reverts(conn: &Connection, manifest_id: &str) -> Result<usize, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM manifest_reverts WHERE manifest_id = ?1",
        params![manifest_id],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as usize)
}

pub fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO snapshots (id, name, root_path, stats, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.id,
            snapshot.name,
            snapshot.root_path,
            serde_json::to_string(&snapshot.stats)?,
            snapshot.created_at,
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO snapshot_files (snapshot_id, position, relative_path, size_bytes, modified_at, sha256)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, file) in snapshot.files.iter().enumerate() {
            stmt.execute(params![
                snapshot.id,
                position as i64,
                file.relative_path,
                file.size_bytes as i64,
                file.modified_at,
                file.sha256,
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

fn snapshot_header_from_row(row: &Row<'_>) -> Result<(SnapshotHeader, String), rusqlite::Error> {
    let stats: String = row.get(3)?;
    Ok((
        SnapshotHeader {
            id: row.get(0)?,
            name: row.get(1)?,
            root_path: row.get(2)?,
            created_at: row.get(4)?,
            stats: Default::default(),
        },
        stats,
    ))
}

fn decode_snapshot_header(
    (mut header, stats): (SnapshotHeader, String),
) -> Result<SnapshotHeader, AppError> {
    header.stats = serde_json::from_str(&stats)?;
    Ok(header)
}

pub fn get_snapshot(conn: &Connection, id: &str) -> Result<Option<Snapshot>, AppError> {
    let header = conn
        .query_row(
            "SELECT id, name, root_path, stats, created_at FROM snapshots WHERE id = ?1",
            params![id],
            snapshot_header_from_row,
        )
        .optional()?;
    let Some(raw) = header else {
        return Ok(None);
    };
    let header = decode_snapshot_header(raw)?;

    let mut stmt = conn.prepare(
        "SELECT relative_path, size_bytes, modified_at, sha256
         FROM snapshot_files WHERE snapshot_id = ?1 ORDER BY position ASC",
    )?;
    let files = stmt
        .query_map(params![id], |row| {
            let size: i64 = row.get(1)?;
            Ok(SnapshotFile {
                relative_path: row.get(0)?,
                size_bytes: size.max(0) as u64,
                modified_at: row.get(2)?,
                sha256: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Snapshot {
        id: header.id,
        name: header.name,
        root_path: header.root_path,
        created_at: header.created_at,
        stats: header.stats,
        files,
    }))
}

/// Most recent first, without the file lists.
pub fn list_snapshots(conn: &Connection) -> Result<Vec<SnapshotHeader>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, root_path, stats, created_at FROM snapshots ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([], snapshot_header_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_snapshot_header).collect()
}

// Needed for rusqlite optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
