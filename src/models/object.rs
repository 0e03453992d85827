//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A raw entry of an object listing, before any access URL is derived.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object key (path-like identifier within the bucket).
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last modified.
    pub last_modified: DateTime<Utc>,
}

/// A single object within a bucket, together with the URL it can be
/// fetched from.
///
/// `url` is never stored anywhere: it is recomputed from the bucket policy
/// each time a `StoredFile` is produced, so it is either a stable public path
/// (shared bucket) or a presigned URL that eventually expires.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Object key, unique within its bucket. May contain `/`.
    pub filename: String,

    /// Owning bucket.
    pub bucket_name: String,

    /// Timestamp when the object was last modified.
    pub last_modified: DateTime<Utc>,

    /// Size in bytes.
    pub size: u64,

    /// Access URL derived at read time.
    pub url: Url,
}

impl StoredFile {
    pub fn from_entry(bucket_name: &str, entry: ObjectEntry, url: Url) -> Self {
        Self {
            filename: entry.name,
            bucket_name: bucket_name.to_string(),
            last_modified: entry.last_modified,
            size: entry.size,
            url,
        }
    }
}
