use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::error::AppError;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "tsv", "log", "json", "yaml", "yml", "toml", "ini",
    "xml", "html", "htm", "css", "js", "ts", "py", "rs", "go", "java", "c", "h", "cpp", "sh",
    "sql", "tex",
];

/// Produces a short textual excerpt for one file type.
pub trait ExcerptExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Option<String>, AppError>;
}

impl<F> ExcerptExtractor for F
where
    F: Fn(&Path) -> Result<Option<String>, AppError> + Send + Sync,
{
    fn extract(&self, path: &Path) -> Result<Option<String>, AppError> {
        self(path)
    }
}

/// Reads the head of a UTF-8-ish file and collapses its whitespace.
pub struct PlainTextExtractor {
    pub max_bytes: u64,
    pub max_chars: usize,
}

impl ExcerptExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Option<String>, AppError> {
        let mut buffer = Vec::new();
        File::open(path)?
            .take(self.max_bytes)
            .read_to_end(&mut buffer)?;
        if buffer.contains(&0) {
            return Ok(None);
        }
        Ok(compact_snippet(&String::from_utf8_lossy(&buffer), self.max_chars))
    }
}

/// Extension (lower-case, no dot) to extractor lookup.
#[derive(Clone, Default)]
pub struct ExcerptRegistry {
    extractors: HashMap<String, Arc<dyn ExcerptExtractor>>,
}

impl ExcerptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plain_text(max_bytes: u64, max_chars: usize) -> Self {
        let mut registry = Self::new();
        let extractor: Arc<dyn ExcerptExtractor> = Arc::new(PlainTextExtractor {
            max_bytes,
            max_chars,
        });
        for extension in TEXT_EXTENSIONS {
            registry.register_shared(extension, extractor.clone());
        }
        registry
    }

    pub fn register(&mut self, extension: &str, extractor: impl ExcerptExtractor + 'static) {
        self.register_shared(extension, Arc::new(extractor));
    }

    fn register_shared(&mut self, extension: &str, extractor: Arc<dyn ExcerptExtractor>) {
        self.extractors
            .insert(extension.trim_start_matches('.').to_lowercase(), extractor);
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extractors.contains_key(extension)
    }

    /// Extraction failures, panics included, are logged and yield `None`.
    pub fn excerpt_for(&self, path: &Path, extension: Option<&str>) -> Option<String> {
        let extractor = self.extractors.get(extension?)?;
        match panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(path))) {
            Ok(Ok(excerpt)) => excerpt.filter(|text| !text.is_empty()),
            Ok(Err(err)) => {
                warn!(path = %path.display(), error = %err, "excerpt extraction failed");
                None
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(path = %path.display(), %reason, "excerpt extractor panicked");
                None
            }
        }
    }
}

pub fn compact_snippet(raw: &str, max_chars: usize) -> Option<String> {
    let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.is_empty() {
        return None;
    }
    Some(compact.chars().take(max_chars).collect())
}
