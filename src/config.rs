use std::path::{Path, PathBuf};

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_SKIP_NAMES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    "node_modules",
    "__pycache__",
    ".vscode",
    ".idea",
    "venv",
    "env",
    ".env",
    "virtualenv",
    "dist",
    "build",
    "target",
    "out",
    "bin",
    "obj",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    "coverage",
    ".coverage",
    "htmlcov",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
    pub default_max_files: usize,
    pub max_files_limit: usize,
    pub skip_names: Vec<String>,
    pub excerpt_max_chars: usize,
    pub excerpt_max_bytes: u64,
    pub hash_size_limit: u64,
    pub max_retained_tasks: usize,
    pub advisory_max_files: usize,
    pub cleanup_empty_dirs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
            data_dir: None,
            log_level: "info".to_string(),
            default_max_files: 1000,
            max_files_limit: 10_000,
            skip_names: DEFAULT_SKIP_NAMES.iter().map(|s| s.to_string()).collect(),
            excerpt_max_chars: 200,
            excerpt_max_bytes: 64 * 1024,
            hash_size_limit: 10 * 1024 * 1024,
            max_retained_tasks: 256,
            advisory_max_files: 500,
            cleanup_empty_dirs: true,
        }
    }
}

impl AppConfig {
    /// Layers `file-organizer.toml` (or `path`) and `FILE_ORGANIZER_*`
    /// variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<AppConfig, AppError> {
        let file = match path {
            Some(path) => ConfigFile::from(path).required(true),
            None => ConfigFile::with_name("file-organizer").required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("FILE_ORGANIZER").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize::<AppConfig>()?)
    }

    pub fn resolve_data_dir(&self) -> Result<PathBuf, AppError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "file-organizer")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| AppError::General("could not resolve a data directory".to_string()))
    }

    /// Clamps a requested scan budget into `1..=max_files_limit`.
    pub fn effective_max_files(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_max_files)
            .clamp(1, self.max_files_limit.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "port = 9000\nskip_names = [\"cache\"]\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.skip_names, vec!["cache".to_string()]);
        assert_eq!(config.default_max_files, 1000);
        assert!(config.cleanup_empty_dirs);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn max_files_is_clamped() {
        let config = AppConfig::default();
        assert_eq!(config.effective_max_files(None), 1000);
        assert_eq!(config.effective_max_files(Some(0)), 1);
        assert_eq!(config.effective_max_files(Some(50_000)), 10_000);
        assert_eq!(config.effective_max_files(Some(5)), 5);
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = AppConfig {
            data_dir: Some(PathBuf::from("/srv/organizer")),
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_data_dir().unwrap(), PathBuf::from("/srv/organizer"));
    }
}
