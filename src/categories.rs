// 🏷️ Category Resource - read-only category catalog
//
// A sidecar `categories.json` wins when present and is served byte-for-byte;
// otherwise the built-in list is returned. Failures come back as JSON too.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resource URI the dispatcher exposes the catalog under
pub const CATEGORIES_URI: &str = "expense:///categories";

pub const CATEGORIES_MIME_TYPE: &str = "application/json";

/// Built-in categories, in display order
pub const DEFAULT_CATEGORIES: [&str; 10] = [
    "Food & Dining",
    "Transportation",
    "Shopping",
    "Entertainment",
    "Bills & Utilities",
    "Healthcare",
    "Travel",
    "Education",
    "Business",
    "Other",
];

#[derive(Debug, Clone)]
pub struct CategoryProvider {
    path: PathBuf,
}

impl CategoryProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The catalog as a JSON document. Never fails: I/O errors are rendered
    /// as `{"error": "..."}`.
    pub fn read(&self) -> String {
        match self.try_read() {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read categories");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    fn try_read(&self) -> anyhow::Result<String> {
        if self.path.try_exists()? {
            // Verbatim: no parsing, a malformed file reaches the caller as-is
            return Ok(fs::read_to_string(&self.path)?);
        }
        default_categories_json()
    }
}

/// `{"categories": [...]}` with the built-in list, pretty-printed
pub fn default_categories_json() -> anyhow::Result<String> {
    let body = serde_json::to_string_pretty(&json!({ "categories": DEFAULT_CATEGORIES }))?;
    Ok(body)
}
