use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::file_record::{
    FileCategory, FileRecord, Inventory, InventorySummary, NO_EXTENSION_KEY,
};
use crate::models::plan::Plan;
use crate::scope_path;
use crate::services::execute_service::next_free_path;

/// One move candidate as shown to an advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryFile {
    pub relative_path: String,
    pub extension: Option<String>,
    pub category: FileCategory,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub excerpt: Option<String>,
}

impl From<&FileRecord> for AdvisoryFile {
    fn from(record: &FileRecord) -> Self {
        Self {
            relative_path: record.relative_path.clone(),
            extension: record.extension.clone(),
            category: record.category,
            size_bytes: record.size_bytes,
            modified_at: record.modified_at,
            excerpt: record.excerpt.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub root_path: String,
    pub summary: InventorySummary,
    pub tree: Value,
    pub files: Vec<AdvisoryFile>,
    /// Candidates left out by sampling.
    pub omitted: usize,
    #[serde(default)]
    pub memory: OrganizationMemory,
}

/// Where earlier plans for the same root filed each file type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMemory {
    pub plans_considered: usize,
    pub folders: BTreeSet<String>,
    /// Extension key to destination folders, most recent plan first.
    pub patterns: BTreeMap<String, Vec<String>>,
}

impl OrganizationMemory {
    /// `plans` must be ordered newest first.
    pub fn from_plans<'a>(plans: impl IntoIterator<Item = &'a Plan>) -> Self {
        let mut memory = Self::default();
        for plan in plans {
            memory.plans_considered += 1;
            memory.folders.extend(plan.folders.iter().cloned());
            for mv in &plan.moves {
                let Some(destination) = scope_path::resolve_relative(&mv.destination) else {
                    continue;
                };
                let folder = scope_path::parent_of(&destination);
                if folder.is_empty() {
                    continue;
                }
                let seen = memory.patterns.entry(extension_key(&mv.source)).or_default();
                if !seen.iter().any(|known| known == folder) {
                    seen.push(folder.to_string());
                }
            }
        }
        memory
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.folders.is_empty()
    }

    /// Most recently used folder for `extension_key`.
    pub fn preferred_folder(&self, extension_key: &str) -> Option<&str> {
        self.patterns
            .get(extension_key)
            .and_then(|folders| folders.first())
            .map(String::as_str)
    }
}

fn extension_key(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| NO_EXTENSION_KEY.to_string())
}

/// External collaborator that proposes a plan for an inventory.
///
/// The returned payload is untrusted and must go through
/// `Plan::from_untrusted` and validation before it can be executed.
pub trait Advisor: Send + Sync {
    fn propose(&self, request: &AdvisoryRequest) -> Result<Value, AppError>;
}

/// Builds the advisory request from the move candidates of `inventory`.
///
/// Files inside organized regions are never offered. Above `max_files`
/// candidates, files are sampled round-robin across extensions so every
/// file type stays represented.
pub fn build_request(
    inventory: &Inventory,
    max_files: usize,
    memory: OrganizationMemory,
) -> AdvisoryRequest {
    let candidates: Vec<&FileRecord> = inventory
        .files
        .iter()
        .filter(|file| !file.inside_organized_region)
        .collect();
    let total = candidates.len();
    let selected = sample_by_extension(candidates, max_files);

    AdvisoryRequest {
        root_path: inventory.root_path.clone(),
        summary: inventory.summary.clone(),
        tree: build_tree_summary(&selected),
        omitted: total - selected.len(),
        files: selected.into_iter().map(AdvisoryFile::from).collect(),
        memory,
    }
}

fn sample_by_extension(candidates: Vec<&FileRecord>, max_files: usize) -> Vec<&FileRecord> {
    if candidates.len() <= max_files {
        return candidates;
    }

    let mut buckets: BTreeMap<&str, VecDeque<&FileRecord>> = BTreeMap::new();
    for file in candidates {
        buckets.entry(file.extension_key()).or_default().push_back(file);
    }

    let mut selected = Vec::with_capacity(max_files);
    while selected.len() < max_files {
        let mut progressed = false;
        for bucket in buckets.values_mut() {
            if selected.len() >= max_files {
                break;
            }
            if let Some(file) = bucket.pop_front() {
                selected.push(file);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    selected
}

pub fn build_tree_summary(files: &[&FileRecord]) -> Value {
    let mut top_level_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();

    for file in files {
        let top = match file.relative_path.split_once('/') {
            Some((first, _)) => first.to_string(),
            None => "(root)".to_string(),
        };
        *top_level_counts.entry(top).or_default() += 1;
        *category_counts
            .entry(file.category.as_str().to_string())
            .or_default() += 1;
    }

    json!({
        "top_level_counts": top_level_counts,
        "category_counts": category_counts,
    })
}

/// Files every candidate under a top-level category folder; images and
/// videos are further grouped by modification month. Other file types go
/// where earlier plans for the root put them, when there is a record of it.
pub struct CategoryAdvisor;

impl CategoryAdvisor {
    fn target_folder(file: &AdvisoryFile, memory: &OrganizationMemory) -> String {
        let base = file.category.folder_name();
        match (file.category, file.modified_at) {
            (FileCategory::Images | FileCategory::Videos, Some(modified)) => {
                format!("{base}/{}", modified.format("%Y-%m"))
            }
            _ => {
                let key = file.extension.as_deref().unwrap_or(NO_EXTENSION_KEY);
                memory.preferred_folder(key).unwrap_or(base).to_string()
            }
        }
    }
}

impl Advisor for CategoryAdvisor {
    fn propose(&self, request: &AdvisoryRequest) -> Result<Value, AppError> {
        let mut folders = BTreeSet::new();
        let mut moves = Vec::new();
        let mut used: HashSet<PathBuf> = request
            .files
            .iter()
            .map(|file| PathBuf::from(&file.relative_path))
            .collect();

        for file in &request.files {
            let folder = Self::target_folder(file, &request.memory);
            if file.relative_path.starts_with(&format!("{folder}/")) {
                continue;
            }

            let name = file
                .relative_path
                .rsplit('/')
                .next()
                .unwrap_or(&file.relative_path);
            let planned = Path::new(&folder).join(name);
            let destination = next_free_path(&planned, |candidate| used.contains(candidate));
            used.insert(destination.clone());
            folders.insert(folder.clone());

            moves.push(json!({
                "file": file.relative_path,
                "new_path": destination.to_string_lossy().replace('\\', "/"),
                "reason": format!("{} file", file.category),
            }));
        }

        Ok(json!({ "folders": folders, "moves": moves }))
    }
}
