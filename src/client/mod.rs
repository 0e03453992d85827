//! Capability interface of the wrapped object-storage client.
//!
//! The facade never talks to the network itself. Everything it needs from
//! the server goes through [`StorageClient`], implemented by [`S3Client`]
//! for a real MinIO / S3 endpoint and by [`MemoryClient`] in-process.

pub mod memory;
pub mod s3;

use crate::{
    errors::Result,
    models::{BucketInfo, ObjectEntry},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{fmt, io, path::Path, time::Duration};
use url::Url;

pub use memory::MemoryClient;
pub use s3::S3Client;

/// Object payload as a stream of byte chunks.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// Stream of entries produced by an object listing.
pub type ObjectListing = BoxStream<'static, Result<ObjectEntry>>;

/// HTTP method a presigned URL is minted for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
}

impl fmt::Display for PresignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Put => f.write_str("PUT"),
        }
    }
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn make_bucket(&self, bucket: &str) -> Result<()>;

    async fn remove_bucket(&self, bucket: &str) -> Result<()>;

    /// List objects of `bucket`, optionally restricted to keys starting with
    /// `prefix`. Non-recursive listings stop at the first `/` after the
    /// prefix and skip the grouped entries.
    fn list_objects(&self, bucket: &str, prefix: Option<&str>, recursive: bool) -> ObjectListing;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str)
    -> Result<()>;

    /// Upload the content of the local file at `path`, streamed from disk.
    async fn put_object_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()>;

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<()>;

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Raw policy document of `bucket`, empty when none is set.
    async fn get_bucket_policy(&self, bucket: &str) -> Result<String>;

    async fn set_bucket_policy(&self, bucket: &str, document: &str) -> Result<()>;

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expiry: Duration,
    ) -> Result<Url>;
}
