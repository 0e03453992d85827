//! In-process [`StorageClient`] holding buckets and objects in memory.
//!
//! Used by the test suite and handy for local development without a MinIO
//! server. Every call is recorded by operation name, and individual
//! operations can be made to fail, so callers can observe exactly which
//! requests a facade operation issued.

use super::{ObjectBody, ObjectListing, PresignMethod, StorageClient};
use crate::{
    errors::{ObjectStoreError, Result},
    models::{BucketInfo, ObjectEntry},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::debug;
use url::Url;
use uuid::Uuid;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9000";

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct Bucket {
    created_at: DateTime<Utc>,
    policy: String,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    calls: Vec<&'static str>,
    failing: BTreeSet<&'static str>,
}

#[derive(Debug)]
pub struct MemoryClient {
    endpoint: String,
    state: Mutex<State>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Base URL used when minting presigned URLs.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Operation names received so far, oldest first.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    /// Number of times `operation` was called.
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == operation).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make every later call of `operation` fail with a transport error.
    pub fn fail_operation(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    pub fn restore_operation(&self, operation: &str) {
        self.lock().failing.remove(operation);
    }

    /// Content type an object was stored with.
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.content_type.clone())
    }

    /// Record `operation` and return its state, or the injected failure.
    fn begin(&self, operation: &'static str) -> Result<MutexGuard<'_, State>> {
        debug!(operation, "memory client call");
        let mut state = self.lock();
        state.calls.push(operation);
        if state.failing.contains(operation) {
            return Err(ObjectStoreError::request(
                operation,
                io::Error::new(io::ErrorKind::ConnectionRefused, "injected failure"),
            ));
        }
        Ok(state)
    }
}

fn no_such_bucket(operation: &'static str, bucket: &str) -> ObjectStoreError {
    ObjectStoreError::request(
        operation,
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("NoSuchBucket: bucket `{bucket}` does not exist"),
        ),
    )
}

fn no_such_key(operation: &'static str, bucket: &str, key: &str) -> ObjectStoreError {
    ObjectStoreError::request(
        operation,
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("NoSuchKey: object `{key}` does not exist in bucket `{bucket}`"),
        ),
    )
}

fn insert_object(
    state: &mut State,
    operation: &'static str,
    bucket: &str,
    key: &str,
    data: Bytes,
    content_type: &str,
) -> Result<()> {
    let b = state
        .buckets
        .get_mut(bucket)
        .ok_or_else(|| no_such_bucket(operation, bucket))?;
    b.objects.insert(
        key.to_string(),
        StoredObject {
            data,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        },
    );
    Ok(())
}

#[async_trait]
impl StorageClient for MemoryClient {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let state = self.begin("list_buckets")?;
        Ok(state
            .buckets
            .iter()
            .map(|(name, bucket)| BucketInfo::new(name.clone(), bucket.created_at))
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let state = self.begin("bucket_exists")?;
        Ok(state.buckets.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.begin("make_bucket")?;
        if state.buckets.contains_key(bucket) {
            return Err(ObjectStoreError::request(
                "make_bucket",
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("BucketAlreadyOwnedByYou: `{bucket}`"),
                ),
            ));
        }
        state.buckets.insert(
            bucket.to_string(),
            Bucket {
                created_at: Utc::now(),
                policy: String::new(),
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.begin("remove_bucket")?;
        match state.buckets.get(bucket) {
            None => Err(no_such_bucket("remove_bucket", bucket)),
            Some(b) if !b.objects.is_empty() => Err(ObjectStoreError::request(
                "remove_bucket",
                io::Error::other(format!("BucketNotEmpty: `{bucket}`")),
            )),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>, recursive: bool) -> ObjectListing {
        let state = match self.begin("list_objects") {
            Ok(state) => state,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        let Some(b) = state.buckets.get(bucket) else {
            let err = no_such_bucket("list_objects", bucket);
            return stream::once(async move { Err(err) }).boxed();
        };

        let prefix = prefix.unwrap_or_default();
        let entries: Vec<Result<ObjectEntry>> = b
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| recursive || !key[prefix.len()..].contains('/'))
            .map(|(key, object)| {
                Ok(ObjectEntry {
                    name: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: object.last_modified,
                })
            })
            .collect();
        stream::iter(entries).boxed()
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let state = self.begin("get_object")?;
        let b = state
            .buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("get_object", bucket))?;
        let object = b
            .objects
            .get(key)
            .ok_or_else(|| no_such_key("get_object", bucket, key))?;
        let data = object.data.clone();
        Ok(stream::once(async move { Ok(data) }).boxed())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        let mut state = self.begin("put_object")?;
        insert_object(&mut state, "put_object", bucket, key, body, content_type)
    }

    async fn put_object_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|err| ObjectStoreError::request("put_object_file", err))?;
        let mut state = self.begin("put_object_file")?;
        insert_object(&mut state, "put_object_file", bucket, key, data.into(), content_type)
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<()> {
        let mut state = self.begin("copy_object")?;
        let source = state
            .buckets
            .get(source_bucket)
            .ok_or_else(|| no_such_bucket("copy_object", source_bucket))?
            .objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| no_such_key("copy_object", source_bucket, source_key))?;
        let target = state
            .buckets
            .get_mut(target_bucket)
            .ok_or_else(|| no_such_bucket("copy_object", target_bucket))?;
        target.objects.insert(
            target_key.to_string(),
            StoredObject {
                last_modified: Utc::now(),
                ..source
            },
        );
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.begin("remove_object")?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("remove_object", bucket))?;
        // Removing a missing key succeeds, as it does on S3.
        b.objects.remove(key);
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<String> {
        let state = self.begin("get_bucket_policy")?;
        state
            .buckets
            .get(bucket)
            .map(|b| b.policy.clone())
            .ok_or_else(|| no_such_bucket("get_bucket_policy", bucket))
    }

    async fn set_bucket_policy(&self, bucket: &str, document: &str) -> Result<()> {
        let mut state = self.begin("set_bucket_policy")?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("set_bucket_policy", bucket))?;
        b.policy = document.to_string();
        Ok(())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expiry: Duration,
    ) -> Result<Url> {
        drop(self.begin("presigned_url")?);
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "cannot be a base url".into(),
            })?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("X-Amz-Algorithm", "AWS4-HMAC-SHA256")
            .append_pair("X-Amz-Method", &method.to_string())
            .append_pair("X-Amz-Expires", &expiry.as_secs().to_string())
            .append_pair("X-Amz-Signature", &Uuid::new_v4().simple().to_string());
        Ok(url)
    }
}
