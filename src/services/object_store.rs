//! src/services/object_store.rs
//!
//! ObjectStore: bucket and object operations over a [`StorageClient`].
//!
//! The facade owns the existence checks ("is the bucket there", "is the
//! object there") and the access-URL decision: objects of a shared bucket
//! are addressed by their stable public path, everything else by a
//! presigned URL that expires. Every call goes straight to the server; there
//! is no caching and no retrying.

use crate::{
    client::{ObjectBody, PresignMethod, StorageClient},
    errors::{ObjectStoreError, Result},
    models::{AccessPolicy, BucketInfo, SharedPolicyCheck, StoredFile},
    services::{
        content_type,
        paths::{normalize_lookup_name, normalize_upload_path},
    },
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt, pin_mut};
use std::{env, io, path::Path, sync::Arc, time::Duration};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

/// Lifetime of presigned URLs when the caller does not pick one.
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Bucket and object operations against one storage server.
///
/// Cloning is cheap; clones share the underlying client.
#[derive(Clone)]
pub struct ObjectStore {
    client: Arc<dyn StorageClient>,
    policy_check: SharedPolicyCheck,
}

impl ObjectStore {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            policy_check: SharedPolicyCheck::default(),
        }
    }

    /// Choose how bucket policies are classified as shared.
    pub fn with_policy_check(mut self, policy_check: SharedPolicyCheck) -> Self {
        self.policy_check = policy_check;
        self
    }

    pub fn policy_check(&self) -> SharedPolicyCheck {
        self.policy_check
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    // ----- buckets -----

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.client
            .list_buckets()
            .await
            .inspect_err(|err| error!(error = %err, "list buckets failed"))
    }

    /// All buckets accepted by `predicate`.
    pub async fn list_buckets_matching<P>(&self, predicate: P) -> Result<Vec<BucketInfo>>
    where
        P: Fn(&BucketInfo) -> bool,
    {
        let buckets = self.list_buckets().await?;
        Ok(buckets.into_iter().filter(|b| predicate(b)).collect())
    }

    pub async fn get_bucket(&self, name: &str) -> Result<Option<BucketInfo>> {
        let buckets = self.list_buckets().await?;
        Ok(buckets.into_iter().find(|b| b.name == name))
    }

    pub async fn bucket_exists(&self, name: &str) -> Result<bool> {
        self.client
            .bucket_exists(name)
            .await
            .inspect_err(|err| {
                error!(bucket = name, error = %err, "bucket existence check failed")
            })
    }

    /// Create a bucket with the read-and-write policy.
    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        self.create_bucket_with_policy(name, AccessPolicy::default()).await
    }

    /// Create a bucket, then apply `policy` to it.
    ///
    /// Returns [`ObjectStoreError::BucketAlreadyExists`] when the name is
    /// taken. If applying the policy fails the bucket stays created and the
    /// failure is returned.
    pub async fn create_bucket_with_policy(&self, name: &str, policy: AccessPolicy) -> Result<()> {
        if self.bucket_exists(name).await? {
            error!(bucket = name, "bucket already exists");
            return Err(ObjectStoreError::BucketAlreadyExists(name.to_string()));
        }

        self.client
            .make_bucket(name)
            .await
            .inspect_err(|err| error!(bucket = name, error = %err, "create bucket failed"))?;
        info!(bucket = name, "bucket created");

        self.client
            .set_bucket_policy(name, &policy.render(name))
            .await
            .inspect_err(|err| {
                error!(bucket = name, %policy, error = %err, "apply policy to new bucket failed")
            })?;
        debug!(bucket = name, %policy, "bucket policy applied");
        Ok(())
    }

    /// Apply `policy` to an existing bucket. Does nothing if it is absent.
    pub async fn set_bucket_policy(&self, name: &str, policy: AccessPolicy) -> Result<()> {
        if !self.bucket_exists(name).await? {
            debug!(bucket = name, "bucket absent, policy not applied");
            return Ok(());
        }
        self.client
            .set_bucket_policy(name, &policy.render(name))
            .await
            .inspect_err(|err| {
                error!(bucket = name, %policy, error = %err, "set bucket policy failed")
            })?;
        info!(bucket = name, %policy, "bucket policy applied");
        Ok(())
    }

    /// Raw policy document of a bucket; empty if the bucket is absent or has
    /// no policy.
    pub async fn get_bucket_policy(&self, name: &str) -> Result<String> {
        if !self.bucket_exists(name).await? {
            return Ok(String::new());
        }
        self.client
            .get_bucket_policy(name)
            .await
            .inspect_err(|err| error!(bucket = name, error = %err, "get bucket policy failed"))
    }

    /// Whether the policy of `name` makes it a shared bucket.
    pub async fn is_bucket_shared(&self, name: &str) -> Result<bool> {
        let document = self.get_bucket_policy(name).await?;
        Ok(self.policy_check.is_shared(&document))
    }

    /// Delete every object of a bucket, one at a time, then the bucket.
    /// Does nothing if the bucket is absent.
    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        if !self.bucket_exists(name).await? {
            debug!(bucket = name, "bucket absent, nothing to delete");
            return Ok(());
        }

        let keys: Vec<String> = self
            .client
            .list_objects(name, None, true)
            .map_ok(|entry| entry.name)
            .try_collect()
            .await
            .inspect_err(|err| {
                error!(bucket = name, error = %err, "list bucket contents failed")
            })?;
        self.remove_objects(name, &keys).await?;

        self.client
            .remove_bucket(name)
            .await
            .inspect_err(|err| error!(bucket = name, error = %err, "delete bucket failed"))?;
        info!(bucket = name, objects = keys.len(), "bucket deleted");
        Ok(())
    }

    // ----- listing -----

    /// Every object of a bucket, each with its access URL. Empty if the
    /// bucket is absent.
    ///
    /// The URL of each entry costs one policy lookup; see
    /// [`ObjectStore::list_files_batched`] for a single lookup per listing.
    pub async fn list_files(&self, bucket: &str) -> Result<Vec<StoredFile>> {
        self.collect_files(bucket, None).await
    }

    /// Objects whose names start with `prefix`, filtered by the server.
    pub async fn list_files_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<StoredFile>> {
        self.collect_files(bucket, Some(prefix)).await
    }

    /// Objects accepted by `predicate`, filtered after the full listing.
    pub async fn list_files_matching<P>(
        &self,
        bucket: &str,
        predicate: P,
    ) -> Result<Vec<StoredFile>>
    where
        P: Fn(&StoredFile) -> bool,
    {
        let files = self.list_files(bucket).await?;
        Ok(files.into_iter().filter(|f| predicate(f)).collect())
    }

    /// Like [`ObjectStore::list_files`], but the bucket policy is read once
    /// for the whole listing instead of once per entry.
    pub async fn list_files_batched(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<StoredFile>> {
        if !self.bucket_exists(bucket).await? {
            return Ok(Vec::new());
        }
        let document = self.client.get_bucket_policy(bucket).await?;
        let shared = self.policy_check.is_shared(&document);

        let mut listing = self.client.list_objects(bucket, prefix, true);
        let mut files = Vec::new();
        while let Some(entry) = listing.try_next().await.inspect_err(|err| {
            error!(bucket, prefix, error = %err, "list files failed")
        })? {
            let url = self
                .presign(bucket, &entry.name, DEFAULT_URL_EXPIRY, shared)
                .await?;
            files.push(StoredFile::from_entry(bucket, entry, url));
        }
        Ok(files)
    }

    async fn collect_files(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<StoredFile>> {
        if !self.bucket_exists(bucket).await? {
            return Ok(Vec::new());
        }

        let mut listing = self.client.list_objects(bucket, prefix, true);
        let mut files = Vec::new();
        while let Some(entry) = listing.try_next().await.inspect_err(|err| {
            error!(bucket, prefix, error = %err, "list files failed")
        })? {
            let url = self.get_file_url(bucket, &entry.name).await?;
            files.push(StoredFile::from_entry(bucket, entry, url));
        }
        debug!(bucket, prefix, count = files.len(), "files listed");
        Ok(files)
    }

    // ----- single objects -----

    /// Look up one object by exact name.
    ///
    /// The server listing is narrowed by using the name as a prefix, so the
    /// entries are compared again to skip longer names sharing it.
    pub async fn get_file(&self, bucket: &str, filename: &str) -> Result<Option<StoredFile>> {
        if !self.bucket_exists(bucket).await? {
            return Ok(None);
        }
        let name = normalize_lookup_name(filename);

        let mut listing = self.client.list_objects(bucket, Some(name), true);
        while let Some(entry) = listing.try_next().await.inspect_err(|err| {
            error!(bucket, filename = name, error = %err, "get file failed")
        })? {
            if entry.name.trim() == name.trim() {
                let url = self.get_file_url(bucket, name).await?;
                return Ok(Some(StoredFile::from_entry(bucket, entry, url)));
            }
        }
        Ok(None)
    }

    /// Access URL of an object, expiring after [`DEFAULT_URL_EXPIRY`] unless
    /// the bucket is shared.
    pub async fn get_file_url(&self, bucket: &str, filename: &str) -> Result<Url> {
        self.get_file_url_with_expiry(bucket, filename, DEFAULT_URL_EXPIRY).await
    }

    /// Access URL of an object.
    ///
    /// For a shared bucket the query string of the presigned URL is dropped,
    /// leaving the stable public path. Otherwise the presigned URL is
    /// returned as is and stops working after `expiry`.
    pub async fn get_file_url_with_expiry(
        &self,
        bucket: &str,
        filename: &str,
        expiry: Duration,
    ) -> Result<Url> {
        let name = normalize_lookup_name(filename);
        let document = self
            .client
            .get_bucket_policy(bucket)
            .await
            .inspect_err(|err| {
                error!(bucket, filename = name, error = %err, "get file url failed")
            })?;
        let shared = self.policy_check.is_shared(&document);
        self.presign(bucket, name, expiry, shared).await
    }

    async fn presign(
        &self,
        bucket: &str,
        name: &str,
        expiry: Duration,
        shared: bool,
    ) -> Result<Url> {
        let mut url = self
            .client
            .presigned_url(bucket, name, PresignMethod::Get, expiry)
            .await
            .inspect_err(|err| error!(bucket, filename = name, error = %err, "presign failed"))?;
        if shared {
            url.set_query(None);
        }
        Ok(url)
    }

    /// Copy an object, creating the target bucket if needed, and return the
    /// access URL of the copy.
    pub async fn copy_file(
        &self,
        source_bucket: &str,
        source_name: &str,
        target_bucket: &str,
        target_name: &str,
    ) -> Result<Url> {
        let source = normalize_lookup_name(source_name);
        let target = normalize_lookup_name(target_name);

        if self.get_file(source_bucket, source).await?.is_none() {
            error!(bucket = source_bucket, filename = source, "no such file to copy");
            return Err(ObjectStoreError::no_such_file(source_bucket, source));
        }
        self.ensure_bucket(target_bucket).await?;

        self.client
            .copy_object(source_bucket, source, target_bucket, target)
            .await
            .inspect_err(|err| {
                error!(bucket = source_bucket, filename = source, error = %err, "copy file failed")
            })?;
        info!(source_bucket, source, target_bucket, target, "file copied");
        self.get_file_url(target_bucket, target).await
    }

    /// Delete one object. The name is used as is, without lookup
    /// normalization. Does nothing if the bucket is absent.
    pub async fn delete_file(&self, bucket: &str, filename: &str) -> Result<()> {
        if !self.bucket_exists(bucket).await? {
            return Ok(());
        }
        self.remove_objects(bucket, &[filename]).await
    }

    /// Delete objects one after another; the first failure stops the rest.
    /// Does nothing if the bucket is absent.
    pub async fn delete_files<S>(&self, bucket: &str, filenames: &[S]) -> Result<()>
    where
        S: AsRef<str> + Sync,
    {
        if !self.bucket_exists(bucket).await? {
            return Ok(());
        }
        self.remove_objects(bucket, filenames).await
    }

    // Keys are removed exactly as given, the way listings return them.
    // Batch removal is not used: some S3-compatible servers ignore it.
    async fn remove_objects<S>(&self, bucket: &str, filenames: &[S]) -> Result<()>
    where
        S: AsRef<str> + Sync,
    {
        for filename in filenames {
            let name = filename.as_ref();
            self.client
                .remove_object(bucket, name)
                .await
                .inspect_err(|err| {
                    error!(bucket, filename = name, error = %err, "delete file failed")
                })?;
            info!(bucket, filename = name, "file deleted");
        }
        Ok(())
    }

    // ----- downloads -----

    /// Stream the content of an object.
    pub async fn download_file(&self, bucket: &str, filename: &str) -> Result<ObjectBody> {
        let name = normalize_lookup_name(filename);
        if self.get_file(bucket, name).await?.is_none() {
            error!(bucket, filename = name, "no such file to download");
            return Err(ObjectStoreError::no_such_file(bucket, name));
        }
        self.client
            .get_object(bucket, name)
            .await
            .inspect_err(|err| {
                error!(bucket, filename = name, error = %err, "download file failed")
            })
    }

    /// Read the whole content of an object into memory.
    pub async fn download_bytes(&self, bucket: &str, filename: &str) -> Result<Bytes> {
        let mut body = self.download_file(bucket, filename).await?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Download an object to a local file, creating missing parent
    /// directories.
    ///
    /// The payload is written to a temporary sibling and renamed into place
    /// once complete, so a failed download never leaves a partial file at
    /// `path`.
    pub async fn download_file_to(
        &self,
        bucket: &str,
        filename: &str,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let name = normalize_lookup_name(filename);
        let path = path.as_ref();

        if self.get_file(bucket, name).await?.is_none() {
            error!(bucket, filename = name, "no such file to download");
            return Err(ObjectStoreError::no_such_file(bucket, name));
        }
        if path.as_os_str().is_empty() {
            return Err(ObjectStoreError::illegal_path("download path is empty"));
        }
        if fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(ObjectStoreError::PathIsDirectory(path.to_path_buf()));
        }
        let file_name = path.file_name().ok_or_else(|| {
            ObjectStoreError::illegal_path(format!("`{}` does not name a file", path.display()))
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let body = self
            .client
            .get_object(bucket, name)
            .await
            .inspect_err(|err| {
                error!(bucket, filename = name, error = %err, "download file failed")
            })?;

        let tmp_path = path.with_file_name(format!(
            ".{}.tmp-{}",
            file_name.to_string_lossy(),
            Uuid::new_v4()
        ));
        if let Err(err) = write_body(&tmp_path, body).await {
            let _ = fs::remove_file(&tmp_path).await;
            error!(
                bucket,
                filename = name,
                path = %path.display(),
                error = %err,
                "download file failed"
            );
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        info!(bucket, filename = name, path = %path.display(), "file downloaded");
        Ok(())
    }

    // ----- uploads -----

    /// Store `data` under `upload_path`, creating the bucket if needed, and
    /// return the access URL of the new object.
    ///
    /// Without an explicit `content_type` one is guessed from the name and
    /// the leading bytes.
    pub async fn upload(
        &self,
        bucket: &str,
        upload_path: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Result<Url> {
        let data = data.into();
        let name = self.prepare_upload(bucket, upload_path).await?;
        let content_type = resolve_content_type(content_type, &name, &data);
        let size = data.len();

        self.client
            .put_object(bucket, &name, data, &content_type)
            .await
            .inspect_err(|err| {
                error!(bucket, filename = %name, error = %err, "upload file failed")
            })?;
        info!(bucket, filename = %name, size, content_type = %content_type, "file uploaded");

        self.get_file_url(bucket, &name).await
    }

    /// Like [`ObjectStore::upload`], reading the payload from a stream of
    /// chunks.
    ///
    /// Chunks are spooled to a temporary file as they arrive and the object
    /// is uploaded from that file; the payload is never held in memory as a
    /// whole. The spool file is removed whether or not the upload succeeds.
    pub async fn upload_stream<S>(
        &self,
        bucket: &str,
        upload_path: &str,
        stream: S,
        content_type: Option<&str>,
    ) -> Result<Url>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let name = self.prepare_upload(bucket, upload_path).await?;

        let spool = env::temp_dir().join(format!(".upload-{}", Uuid::new_v4()));
        let result = self
            .spool_and_put(bucket, &name, &spool, stream, content_type)
            .await;
        let _ = fs::remove_file(&spool).await;
        result?;

        self.get_file_url(bucket, &name).await
    }

    /// Upload a local file under its own file name.
    pub async fn upload_file(&self, bucket: &str, local_path: impl AsRef<Path>) -> Result<Url> {
        let local_path = local_path.as_ref();
        let name = local_file_name(local_path)?;
        self.upload_file_as(bucket, &name, local_path).await
    }

    /// Upload a local file under `upload_path`. The content type is guessed
    /// from the local file.
    pub async fn upload_file_as(
        &self,
        bucket: &str,
        upload_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<Url> {
        self.upload_file_with(bucket, upload_path, local_path, None).await
    }

    /// Upload a local file under `upload_path`, streaming it from disk.
    ///
    /// Without an explicit `content_type` one is guessed from the local file
    /// name and its leading bytes.
    pub async fn upload_file_with(
        &self,
        bucket: &str,
        upload_path: &str,
        local_path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<Url> {
        let local_path = local_path.as_ref();
        let local_name = local_file_name(local_path)?;
        let head = read_head(local_path).await.inspect_err(|err| {
            error!(path = %local_path.display(), error = %err, "read local file failed")
        })?;

        let name = self.prepare_upload(bucket, upload_path).await?;
        let content_type = resolve_content_type(content_type, &local_name, &head);
        self.put_path(bucket, &name, local_path, &content_type).await?;

        self.get_file_url(bucket, &name).await
    }

    /// Ensure the bucket exists, then turn `upload_path` into an object name.
    async fn prepare_upload(&self, bucket: &str, upload_path: &str) -> Result<String> {
        self.ensure_bucket(bucket).await?;
        normalize_upload_path(upload_path).inspect_err(|err| {
            error!(bucket, upload_path, error = %err, "rejected upload path")
        })
    }

    async fn spool_and_put<S>(
        &self,
        bucket: &str,
        name: &str,
        spool: &Path,
        stream: S,
        content_type: Option<&str>,
    ) -> Result<()>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut file = File::create(spool).await?;
        let mut head = Vec::with_capacity(content_type::SNIFF_LEN);

        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.inspect_err(|err| {
                error!(bucket, filename = name, error = %err, "upload stream failed")
            })?;
            let wanted = content_type::SNIFF_LEN.saturating_sub(head.len());
            head.extend_from_slice(&chunk[..wanted.min(chunk.len())]);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let content_type = resolve_content_type(content_type, name, &head);
        self.put_path(bucket, name, spool, &content_type).await
    }

    async fn put_path(
        &self,
        bucket: &str,
        name: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object_file(bucket, name, path, content_type)
            .await
            .inspect_err(|err| {
                error!(bucket, filename = name, error = %err, "upload file failed")
            })?;
        info!(bucket, filename = name, content_type, "file uploaded");
        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if !self.bucket_exists(bucket).await? {
            self.create_bucket(bucket).await?;
        }
        Ok(())
    }
}

fn resolve_content_type(explicit: Option<&str>, name: &str, head: &[u8]) -> String {
    match explicit.map(str::trim).filter(|c| !c.is_empty()) {
        Some(explicit) => explicit.to_string(),
        None => content_type::guess(name, head).to_string(),
    }
}

async fn read_head(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path).await?;
    let mut head = Vec::with_capacity(content_type::SNIFF_LEN);
    file.take(content_type::SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;
    Ok(head)
}

fn local_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ObjectStoreError::illegal_path(format!("`{}` does not name a file", path.display()))
        })
}

async fn write_body(path: &Path, mut body: ObjectBody) -> io::Result<()> {
    let mut file = File::create(path).await?;
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
