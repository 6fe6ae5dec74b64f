use std::path::{Component, Path, PathBuf};

/// Converts separators to `/` and strips trailing slashes.
pub fn normalize(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

/// Lexically resolves a root-relative path.
///
/// Returns `None` when the path is absolute, carries a drive prefix, climbs
/// above the root with `..`, or resolves to the root itself.
pub fn resolve_relative(path: &str) -> Option<String> {
    let normalized = normalize(path);
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Parent of a resolved relative path, `""` for entries directly under the root.
pub fn parent_of(relative: &str) -> &str {
    relative.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

pub fn depth(relative: &str) -> usize {
    if relative.is_empty() || relative == "." {
        0
    } else {
        relative.split('/').count()
    }
}

/// Every proper ancestor of `relative`, shallowest first.
pub fn ancestors(relative: &str) -> Vec<String> {
    let segments: Vec<&str> = relative.split('/').collect();
    (1..segments.len())
        .map(|end| segments[..end].join("/"))
        .collect()
}

/// `path` relative to `root` with forward slashes, `"."` for the root itself.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = stripped
        .components()
        .filter_map(|component| match component {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Some(".".to_string());
    }
    Some(parts.join("/"))
}

pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Whether `candidate` stays inside `root` once symlinks of its deepest
/// existing ancestor are resolved. `root` must already be canonical.
pub fn is_within_root(root: &Path, candidate: &Path) -> bool {
    let mut existing = candidate;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => return false,
        }
    }

    let Ok(mut resolved) = existing.canonicalize() else {
        return false;
    };
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    resolved.starts_with(root)
}

/// `C:`-style drive prefix.
pub fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}
