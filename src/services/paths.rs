//! Object name normalization for uploads and lookups.

use crate::errors::{ObjectStoreError, Result};
use std::path::MAIN_SEPARATOR;

/// Canonicalize an upload path into an object name.
///
/// Platform separators become `/`, one leading `/` is stripped, and the
/// result must be non-empty and carry a file extension (contain a `.`).
pub fn normalize_upload_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(ObjectStoreError::illegal_path("upload path is empty"));
    }
    let canonical = if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(MAIN_SEPARATOR, "/")
    };
    let name = canonical.strip_prefix('/').unwrap_or(&canonical);
    if name.is_empty() {
        return Err(ObjectStoreError::illegal_path("upload path is empty"));
    }
    if !name.contains('.') {
        return Err(ObjectStoreError::illegal_path(format!(
            "upload path `{path}` is missing a file type"
        )));
    }
    Ok(name.to_string())
}

/// Strip one leading `/` from a lookup name. Nothing else is changed.
pub fn normalize_lookup_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}
