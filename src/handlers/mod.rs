//! Command handlers of the `minio-template` binary.
//!
//! Each handler drives the library facade and prints its result as pretty
//! JSON on stdout.

pub mod bucket_handlers;
pub mod health_handlers;
pub mod object_handlers;

use anyhow::Result;
use minio_template::{DefaultBucketStore, MinioConfig, ObjectStore};
use serde::Serialize;

/// Shared state handed to every handler.
pub struct AppContext {
    pub config: MinioConfig,
    pub store: ObjectStore,
}

impl AppContext {
    pub fn new(config: MinioConfig, store: ObjectStore) -> Self {
        Self { config, store }
    }

    /// Facade over the configured default bucket, created on first use.
    pub async fn default_bucket(&self) -> Result<DefaultBucketStore> {
        let facade =
            DefaultBucketStore::new(self.store.clone(), self.config.default_bucket.clone()).await?;
        Ok(facade)
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
