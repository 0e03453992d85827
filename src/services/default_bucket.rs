//! Facade bound to a single, configured bucket.

use super::object_store::ObjectStore;
use crate::{
    client::ObjectBody,
    errors::{ObjectStoreError, Result},
    models::{AccessPolicy, BucketInfo, StoredFile},
};
use bytes::Bytes;
use futures::Stream;
use std::{io, path::Path, time::Duration};
use tracing::info;
use url::Url;

/// [`ObjectStore`] with every bucket argument fixed to one default bucket.
#[derive(Clone)]
pub struct DefaultBucketStore {
    store: ObjectStore,
    bucket: String,
}

impl DefaultBucketStore {
    /// Bind `store` to `bucket`, creating it with the read-and-write policy
    /// when it does not exist yet.
    pub async fn new(store: ObjectStore, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(ObjectStoreError::Config(
                "default bucket name must not be blank".into(),
            ));
        }
        if !store.bucket_exists(&bucket).await? {
            store
                .create_bucket_with_policy(&bucket, AccessPolicy::ReadAndWrite)
                .await?;
            info!(bucket = %bucket, "default bucket created");
        }
        Ok(Self { store, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// The default bucket as listed by the server.
    pub async fn current_bucket(&self) -> Result<Option<BucketInfo>> {
        self.store.get_bucket(&self.bucket).await
    }

    pub async fn bucket_exists(&self) -> Result<bool> {
        self.store.bucket_exists(&self.bucket).await
    }

    pub async fn set_bucket_policy(&self, policy: AccessPolicy) -> Result<()> {
        self.store.set_bucket_policy(&self.bucket, policy).await
    }

    pub async fn get_bucket_policy(&self) -> Result<String> {
        self.store.get_bucket_policy(&self.bucket).await
    }

    pub async fn is_bucket_shared(&self) -> Result<bool> {
        self.store.is_bucket_shared(&self.bucket).await
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>> {
        self.store.list_files(&self.bucket).await
    }

    pub async fn list_files_with_prefix(&self, prefix: &str) -> Result<Vec<StoredFile>> {
        self.store.list_files_with_prefix(&self.bucket, prefix).await
    }

    pub async fn list_files_matching<P>(&self, predicate: P) -> Result<Vec<StoredFile>>
    where
        P: Fn(&StoredFile) -> bool,
    {
        self.store.list_files_matching(&self.bucket, predicate).await
    }

    pub async fn list_files_batched(&self, prefix: Option<&str>) -> Result<Vec<StoredFile>> {
        self.store.list_files_batched(&self.bucket, prefix).await
    }

    pub async fn get_file(&self, filename: &str) -> Result<Option<StoredFile>> {
        self.store.get_file(&self.bucket, filename).await
    }

    pub async fn get_file_url(&self, filename: &str) -> Result<Url> {
        self.store.get_file_url(&self.bucket, filename).await
    }

    pub async fn get_file_url_with_expiry(&self, filename: &str, expiry: Duration) -> Result<Url> {
        self.store
            .get_file_url_with_expiry(&self.bucket, filename, expiry)
            .await
    }

    /// Copy within the default bucket.
    pub async fn copy_file(&self, source_name: &str, target_name: &str) -> Result<Url> {
        self.store
            .copy_file(&self.bucket, source_name, &self.bucket, target_name)
            .await
    }

    /// Copy from the default bucket into `target_bucket`.
    pub async fn copy_file_to(
        &self,
        source_name: &str,
        target_bucket: &str,
        target_name: &str,
    ) -> Result<Url> {
        self.store
            .copy_file(&self.bucket, source_name, target_bucket, target_name)
            .await
    }

    pub async fn delete_file(&self, filename: &str) -> Result<()> {
        self.store.delete_file(&self.bucket, filename).await
    }

    pub async fn delete_files<S>(&self, filenames: &[S]) -> Result<()>
    where
        S: AsRef<str> + Sync,
    {
        self.store.delete_files(&self.bucket, filenames).await
    }

    pub async fn download_file(&self, filename: &str) -> Result<ObjectBody> {
        self.store.download_file(&self.bucket, filename).await
    }

    pub async fn download_bytes(&self, filename: &str) -> Result<Bytes> {
        self.store.download_bytes(&self.bucket, filename).await
    }

    pub async fn download_file_to(&self, filename: &str, path: impl AsRef<Path>) -> Result<()> {
        self.store
            .download_file_to(&self.bucket, filename, path)
            .await
    }

    pub async fn upload(
        &self,
        upload_path: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Result<Url> {
        self.store
            .upload(&self.bucket, upload_path, data, content_type)
            .await
    }

    pub async fn upload_stream<S>(
        &self,
        upload_path: &str,
        stream: S,
        content_type: Option<&str>,
    ) -> Result<Url>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.store
            .upload_stream(&self.bucket, upload_path, stream, content_type)
            .await
    }

    pub async fn upload_file(&self, local_path: impl AsRef<Path>) -> Result<Url> {
        self.store.upload_file(&self.bucket, local_path).await
    }

    pub async fn upload_file_as(
        &self,
        upload_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<Url> {
        self.store
            .upload_file_as(&self.bucket, upload_path, local_path)
            .await
    }

    pub async fn upload_file_with(
        &self,
        upload_path: &str,
        local_path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<Url> {
        self.store
            .upload_file_with(&self.bucket, upload_path, local_path, content_type)
            .await
    }
}
