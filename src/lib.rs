//! Convenience layer over a MinIO / S3-compatible object store.
//!
//! [`ObjectStore`] covers bucket lifecycle, canned access policies, listing,
//! upload, download, copy and delete, and derives an access URL for every
//! object it hands out. [`DefaultBucketStore`] pins all of that to one
//! configured bucket.

pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;

use std::sync::Arc;

pub use client::{MemoryClient, S3Client, StorageClient};
pub use config::{ConfigArgs, MinioConfig};
pub use errors::{ObjectStoreError, Result};
pub use models::{AccessPolicy, BucketInfo, SharedPolicyCheck, StoredFile};
pub use services::{DEFAULT_URL_EXPIRY, DefaultBucketStore, ObjectStore};

/// Build an [`ObjectStore`] for `config`, after checking the server answers.
pub async fn connect(config: &MinioConfig) -> Result<ObjectStore> {
    let client = S3Client::connect(config).await?;
    Ok(ObjectStore::new(Arc::new(client)).with_policy_check(config.shared_policy_check()))
}

/// Like [`connect`], bound to the configured default bucket.
pub async fn connect_default(config: &MinioConfig) -> Result<DefaultBucketStore> {
    let store = connect(config).await?;
    DefaultBucketStore::new(store, config.default_bucket.clone()).await
}
