//! Represents a bucket as reported by the storage server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level container for objects.
///
/// Buckets carry no client-side state; every `BucketInfo` is a snapshot of
/// what the server returned for the listing that produced it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name, unique on the server.
    pub name: String,

    /// When the server created this bucket.
    pub created_at: DateTime<Utc>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created_at,
        }
    }
}
