use crate::error::AppError;
use crate::scope_path;
use std::path::{Component, Path, PathBuf};

const PROTECTED_ROOTS: &[&str] = &[
    "/Applications",
    "/bin",
    "/boot",
    "/dev",
    "/proc",
    "/sbin",
    "/sys",
    "/usr",
    "/System",
    "/Library",
    "/etc",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

pub fn validate_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(AppError::InvalidPath("path is empty".to_string()));
    }

    if path.contains('\0') {
        return Err(AppError::InvalidPath(
            "path contains a NUL byte".to_string(),
        ));
    }

    let p = Path::new(path);
    if p.components().any(|component| matches!(component, Component::ParentDir)) {
        return Err(AppError::InvalidPath(
            "path traversal (.. component) not allowed".to_string(),
        ));
    }

    Ok(())
}

pub fn is_protected_path(path: &str) -> bool {
    let normalized = scope_path::normalize(path);
    PROTECTED_ROOTS.iter().any(|root| {
        let root_normalized = scope_path::normalize(root);
        if scope_path::has_drive_prefix(&root_normalized) {
            let normalized_lower = normalized.to_ascii_lowercase();
            let root_lower = root_normalized.to_ascii_lowercase();
            normalized_lower == root_lower
                || normalized_lower.starts_with(&format!("{root_lower}/"))
        } else {
            normalized == root_normalized || normalized.starts_with(&format!("{root_normalized}/"))
        }
    })
}

pub fn validate_not_protected(path: &str) -> Result<(), AppError> {
    if is_protected_path(path) {
        return Err(AppError::InvalidPath(format!(
            "operation on protected path not allowed: {path}"
        )));
    }
    Ok(())
}

/// Resolves a user-supplied organize root to its canonical directory.
///
/// Fails with `InvalidPath` when the path is malformed, protected, missing,
/// not a directory, or cannot be listed.
pub fn validate_root(path: &str) -> Result<PathBuf, AppError> {
    validate_path(path)?;
    validate_not_protected(path)?;

    let canonical = Path::new(path)
        .canonicalize()
        .map_err(|e| AppError::InvalidPath(format!("{path}: {e}")))?;
    let canonical_str = canonical.to_string_lossy();
    validate_not_protected(&canonical_str)?;

    if !canonical.is_dir() {
        return Err(AppError::InvalidPath(format!("not a directory: {path}")));
    }
    std::fs::read_dir(&canonical)
        .map_err(|e| AppError::InvalidPath(format!("{path} is not readable: {e}")))?;

    Ok(canonical)
}
