use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key used in `file_types` for files without an extension.
pub const NO_EXTENSION_KEY: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Documents,
    Code,
    Images,
    Videos,
    Audio,
    Archives,
    Spreadsheets,
    Data,
    Other,
}

impl FileCategory {
    pub fn from_extension(extension: Option<&str>) -> Self {
        let Some(extension) = extension else {
            return Self::Other;
        };
        match extension {
            "txt" | "md" | "doc" | "docx" | "pdf" | "rtf" | "odt" | "pages" | "tex" | "eml"
            | "msg" | "ppt" | "pptx" | "key" | "epub" => Self::Documents,
            "rs" | "js" | "jsx" | "ts" | "tsx" | "py" | "go" | "java" | "kt" | "swift" | "c"
            | "cc" | "cpp" | "h" | "hpp" | "cs" | "rb" | "php" | "sh" | "zsh" | "bash" | "ps1"
            | "html" | "css" | "scss" | "sql" | "toml" | "yaml" | "yml" | "ini" => Self::Code,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "heic" | "tif" | "tiff"
            | "ico" | "raw" => Self::Images,
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" | "wmv" | "flv" => Self::Videos,
            "mp3" | "wav" | "aac" | "flac" | "ogg" | "m4a" | "wma" => Self::Audio,
            "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" | "zst" | "dmg" | "iso" => {
                Self::Archives
            }
            "csv" | "tsv" | "xls" | "xlsx" | "ods" | "numbers" => Self::Spreadsheets,
            "json" | "jsonl" | "ndjson" | "xml" | "parquet" | "db" | "sqlite" | "log" => Self::Data,
            _ => Self::Other,
        }
    }

    /// Top-level folder name this category is filed under.
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Documents => "Documents",
            Self::Code => "Code",
            Self::Images => "Images",
            Self::Videos => "Videos",
            Self::Audio => "Audio",
            Self::Archives => "Archives",
            Self::Spreadsheets => "Spreadsheets",
            Self::Data => "Data",
            Self::Other => "Other",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Code => "code",
            Self::Images => "images",
            Self::Videos => "videos",
            Self::Audio => "audio",
            Self::Archives => "archives",
            Self::Spreadsheets => "spreadsheets",
            Self::Data => "data",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documents" => Ok(Self::Documents),
            "code" => Ok(Self::Code),
            "images" => Ok(Self::Images),
            "videos" => Ok(Self::Videos),
            "audio" => Ok(Self::Audio),
            "archives" => Ok(Self::Archives),
            "spreadsheets" => Ok(Self::Spreadsheets),
            "data" => Ok(Self::Data),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown file category: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub relative_path: String,
    pub size_bytes: u64,
    pub extension: Option<String>,
    pub category: FileCategory,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub excerpt: Option<String>,
    pub inside_organized_region: bool,
}

impl FileRecord {
    pub fn extension_key(&self) -> &str {
        self.extension
            .as_deref()
            .filter(|ext| !ext.is_empty())
            .unwrap_or(NO_EXTENSION_KEY)
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub file_types: BTreeMap<String, usize>,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub organized_roots: Vec<String>,
    pub organized_files: usize,
    pub max_files: usize,
    pub truncated: bool,
}

impl InventorySummary {
    pub fn from_records(
        files: &[FileRecord],
        organized_roots: Vec<String>,
        max_files: usize,
        truncated: bool,
    ) -> Self {
        let mut file_types = BTreeMap::new();
        let mut total_size_bytes = 0u64;
        let mut organized_files = 0usize;
        for file in files {
            *file_types.entry(file.extension_key().to_string()).or_default() += 1;
            total_size_bytes = total_size_bytes.saturating_add(file.size_bytes);
            if file.inside_organized_region {
                organized_files += 1;
            }
        }

        Self {
            file_types,
            total_files: files.len(),
            total_size_bytes,
            organized_roots,
            organized_files,
            max_files,
            truncated,
        }
    }
}

/// Snapshot of one completed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub id: String,
    pub root_path: String,
    pub files: Vec<FileRecord>,
    pub summary: InventorySummary,
    pub created_at: DateTime<Utc>,
}

impl Inventory {
    pub fn find(&self, relative_path: &str) -> Option<&FileRecord> {
        self.files
            .iter()
            .find(|file| file.relative_path == relative_path)
    }

    /// Relative paths of files that must never become move sources.
    pub fn protected_sources(&self) -> HashSet<String> {
        self.files
            .iter()
            .filter(|file| file.inside_organized_region)
            .map(|file| file.relative_path.clone())
            .collect()
    }

    pub fn header(&self) -> InventoryHeader {
        InventoryHeader {
            id: self.id.clone(),
            root_path: self.root_path.clone(),
            summary: self.summary.clone(),
            created_at: self.created_at,
        }
    }
}

/// Inventory metadata without its file list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryHeader {
    pub id: String,
    pub root_path: String,
    pub summary: InventorySummary,
    pub created_at: DateTime<Utc>,
}
