use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::AppError;
use crate::models::file_record::{FileCategory, FileRecord, Inventory, InventorySummary};
use crate::scope_path;
use crate::services::excerpt_service::ExcerptRegistry;
use crate::services::task_service::TaskHandle;
use crate::shell::safety::validate_root;

const PROGRESS_EVERY: usize = 25;

const VCS_MARKERS: &[&str] = &[".git", ".svn", ".hg", ".bzr"];

const MANIFEST_MARKERS: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "Pipfile",
    "poetry.lock",
    "setup.py",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "CMakeLists.txt",
    "Gemfile",
    "composer.json",
];

const MANIFEST_SUFFIXES: &[&str] = &[".sln", ".xcodeproj", ".csproj"];

const ARCHIVE_WORDS: &[&str] = &["archive", "archives", "archived", "backup", "backups"];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_files: usize,
    pub skip_names: Vec<String>,
}

/// Walks `root_path` depth-first and builds an inventory of its files.
///
/// Files below a directory that looks organized are still recorded, flagged
/// `inside_organized_region`. Only the top-most organized roots are reported.
pub fn scan(
    root_path: &str,
    options: &ScanOptions,
    excerpts: &ExcerptRegistry,
    handle: &TaskHandle,
) -> Result<Inventory, AppError> {
    let root = validate_root(root_path)?;
    let max_files = options.max_files.max(1);
    let skip: HashSet<String> = options
        .skip_names
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    info!(root = %root.display(), max_files, "scan started");

    let mut files: Vec<FileRecord> = Vec::new();
    let mut organized_roots = Vec::new();
    let mut region: Option<PathBuf> = None;
    let mut truncated = false;

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && skip.contains(&entry.file_name().to_string_lossy().to_lowercase()))
        });

    for entry in walker {
        handle.checkpoint()?;

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(AppError::InvalidPath(format!("{root_path}: {err}")));
            }
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        if region
            .as_ref()
            .is_some_and(|region| !entry.path().starts_with(region))
        {
            region = None;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if region.is_none() && is_organized_dir(entry.path(), entry.depth()) {
                let relative = scope_path::relative_to(&root, entry.path())
                    .unwrap_or_else(|| ".".to_string());
                debug!(dir = %relative, "organized region detected");
                organized_roots.push(relative);
                region = Some(entry.path().to_path_buf());
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        if files.len() >= max_files {
            truncated = true;
            break;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "skipping file without metadata");
                continue;
            }
        };
        let Some(relative_path) = scope_path::relative_to(&root, entry.path()) else {
            continue;
        };
        let extension = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty());

        files.push(FileRecord {
            path: entry.path().to_string_lossy().to_string(),
            relative_path,
            size_bytes: metadata.len(),
            category: FileCategory::from_extension(extension.as_deref()),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            excerpt: excerpts.excerpt_for(entry.path(), extension.as_deref()),
            extension,
            inside_organized_region: region.is_some(),
        });

        if files.len() % PROGRESS_EVERY == 0 {
            handle.progress(
                files.len() as f64 / max_files as f64,
                format!("scanned {} file(s)", files.len()),
            );
        }
    }

    handle.progress(
        files.len() as f64 / max_files as f64,
        format!("scanned {} file(s)", files.len()),
    );

    let summary = InventorySummary::from_records(&files, organized_roots, max_files, truncated);
    info!(
        root = %root.display(),
        files = summary.total_files,
        organized = summary.organized_files,
        truncated,
        "scan finished"
    );

    Ok(Inventory {
        id: uuid::Uuid::new_v4().to_string(),
        root_path: root.to_string_lossy().to_string(),
        files,
        summary,
        created_at: Utc::now(),
    })
}

/// A directory is organized when it carries a VCS or dependency-manifest
/// marker, or (below the scan root) when its own name is a dated archive.
fn is_organized_dir(dir: &Path, depth: usize) -> bool {
    if depth > 0 {
        if let Some(name) = dir.file_name() {
            if is_dated_folder_name(&name.to_string_lossy()) {
                return true;
            }
        }
    }

    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(|entry| entry.ok()).any(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        VCS_MARKERS.contains(&name.as_str())
            || MANIFEST_MARKERS.contains(&name.as_str())
            || MANIFEST_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
    })
}

fn is_year(token: &str) -> bool {
    token.len() == 4
        && token.chars().all(|c| c.is_ascii_digit())
        && token
            .parse::<u16>()
            .is_ok_and(|year| (1900..=2100).contains(&year))
}

pub fn is_dated_folder_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();
    let Some(first) = tokens.first() else {
        return false;
    };
    if is_year(first) {
        return true;
    }
    tokens.iter().any(|token| ARCHIVE_WORDS.contains(token))
        && tokens.iter().any(|token| is_year(token))
}
