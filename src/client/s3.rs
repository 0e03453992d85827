//! [`StorageClient`] over the AWS S3 SDK, configured for MinIO.
//!
//! MinIO speaks the S3 protocol, so the SDK is pointed at the configured
//! endpoint with static credentials and path-style addressing. Retries are
//! disabled: a failed request fails the facade operation that issued it.

use super::{ObjectBody, ObjectListing, PresignMethod, StorageClient};
use crate::{
    config::MinioConfig,
    errors::{ObjectStoreError, Result},
    models::{BucketInfo, ObjectEntry},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{
        BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region, retry::RetryConfig,
        timeout::TimeoutConfig,
    },
    error::{ProvideErrorMetadata, SdkError},
    operation::list_objects_v2::builders::ListObjectsV2FluentBuilder,
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as AwsDateTime},
    types::Object,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use std::{fmt, future::Future, path::Path, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};
use url::Url;

const CREDENTIALS_PROVIDER: &str = "minio-template";
const NO_SUCH_BUCKET_POLICY: &str = "NoSuchBucketPolicy";

/// S3 protocol client bound to one MinIO endpoint.
#[derive(Clone)]
pub struct S3Client {
    inner: Client,
    endpoint: Url,
}

impl S3Client {
    /// Build a client from `config` without touching the network.
    ///
    /// Fails when the configuration is incomplete or the endpoint does not
    /// parse.
    pub fn new(config: &MinioConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;

        let credentials = Credentials::new(
            config.username.clone(),
            config.password.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.read_timeout_ms))
            .operation_attempt_timeout(Duration::from_millis(config.write_timeout_ms))
            .build();

        let s3_config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(true)
            .timeout_config(timeouts)
            .retry_config(RetryConfig::disabled())
            .build();

        info!(endpoint = %endpoint, region = %config.region, "MinIO client configured");

        Ok(Self {
            inner: Client::from_conf(s3_config),
            endpoint,
        })
    }

    /// Build a client and verify the server answers a bucket listing.
    ///
    /// Any failure of the self-test is a fatal [`ObjectStoreError::Connection`].
    pub async fn connect(config: &MinioConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.check_connection().await?;
        Ok(client)
    }

    /// Issue a lightweight listing against the server.
    pub async fn check_connection(&self) -> Result<()> {
        debug!(endpoint = %self.endpoint, "Testing MinIO connectivity");
        match self.inner.list_buckets().send().await {
            Ok(_) => {
                info!(endpoint = %self.endpoint, "MinIO connectivity test successful");
                Ok(())
            }
            Err(err) => {
                error!(endpoint = %self.endpoint, error = %err, "MinIO connectivity test failed");
                Err(ObjectStoreError::Connection {
                    endpoint: self.endpoint.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

fn to_utc(timestamp: Option<&AwsDateTime>) -> DateTime<Utc> {
    timestamp
        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_default()
}

fn to_entry(object: &Object) -> ObjectEntry {
    ObjectEntry {
        name: object.key().unwrap_or_default().to_string(),
        size: object.size().unwrap_or_default().max(0) as u64,
        last_modified: to_utc(object.last_modified()),
    }
}

/// One page of an object listing and the token of the page after it.
#[derive(Debug, Default)]
struct Page {
    entries: Vec<ObjectEntry>,
    next: Option<String>,
}

/// Continuation token to request next, if the listing is incomplete.
fn next_token(is_truncated: Option<bool>, token: Option<&str>) -> Option<String> {
    match (is_truncated, token) {
        (Some(true), Some(token)) if !token.is_empty() => Some(token.to_string()),
        _ => None,
    }
}

/// Whether a service error code means the bucket simply has no policy.
fn is_missing_policy(code: Option<&str>) -> bool {
    code == Some(NO_SUCH_BUCKET_POLICY)
}

async fn fetch_page(request: ListObjectsV2FluentBuilder) -> Result<Page> {
    let page = request
        .send()
        .await
        .map_err(|err| ObjectStoreError::request("list_objects_v2", err))?;
    Ok(Page {
        entries: page.contents().iter().map(to_entry).collect(),
        next: next_token(page.is_truncated(), page.next_continuation_token()),
    })
}

// `state` is `None` once the last page has been consumed and `Some(None)`
// before the first one.
async fn next_page<F, Fut>(
    fetch: F,
    state: Option<Option<String>>,
) -> Result<Option<(Vec<ObjectEntry>, (F, Option<Option<String>>))>>
where
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    let Some(token) = state else {
        return Ok(None);
    };
    let page = fetch(token).await?;
    let next = page.next.map(Some);
    Ok(Some((page.entries, (fetch, next))))
}

/// Flatten the pages produced by `fetch` into one listing, following
/// continuation tokens until a page reports none.
fn paginate<F, Fut>(fetch: F) -> ObjectListing
where
    F: Fn(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Page>> + Send + 'static,
{
    stream::try_unfold((fetch, Some(None)), |(fetch, state)| next_page(fetch, state))
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<_, ObjectStoreError>)))
        .try_flatten()
        .boxed()
}

#[async_trait]
impl StorageClient for S3Client {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        debug!("list_buckets");
        let output = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("list_buckets", err))?;

        Ok(output
            .buckets()
            .iter()
            .map(|bucket| {
                BucketInfo::new(
                    bucket.name().unwrap_or_default(),
                    to_utc(bucket.creation_date()),
                )
            })
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        debug!(bucket, "head_bucket");
        match self.inner.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service)) if service.err().is_not_found() => Ok(false),
            Err(err) => Err(ObjectStoreError::request("head_bucket", err)),
        }
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        debug!(bucket, "create_bucket");
        self.inner
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("create_bucket", err))?;
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        debug!(bucket, "delete_bucket");
        self.inner
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("delete_bucket", err))?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>, recursive: bool) -> ObjectListing {
        debug!(bucket, prefix, recursive, "list_objects_v2");
        let client = self.inner.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.map(str::to_string);
        let delimiter = (!recursive).then(|| "/".to_string());

        paginate(move |token| {
            fetch_page(
                client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .set_prefix(prefix.clone())
                    .set_delimiter(delimiter.clone())
                    .set_continuation_token(token),
            )
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        debug!(bucket, key, "get_object");
        let output = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("get_object", err))?;
        Ok(ReaderStream::new(output.body.into_async_read()).boxed())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        debug!(bucket, key, size = body.len(), content_type, "put_object");
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("put_object", err))?;
        Ok(())
    }

    async fn put_object_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()> {
        debug!(bucket, key, path = %path.display(), content_type, "put_object");
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| ObjectStoreError::request("put_object", err))?;
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("put_object", err))?;
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<()> {
        debug!(source_bucket, source_key, target_bucket, target_key, "copy_object");
        self.inner
            .copy_object()
            .copy_source(format!(
                "{}/{}",
                source_bucket,
                urlencoding::encode(source_key)
            ))
            .bucket(target_bucket)
            .key(target_key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("copy_object", err))?;
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        debug!(bucket, key, "delete_object");
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("delete_object", err))?;
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<String> {
        debug!(bucket, "get_bucket_policy");
        match self.inner.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().unwrap_or_default().to_string()),
            Err(err) if is_missing_policy(err.as_service_error().and_then(|e| e.code())) => {
                Ok(String::new())
            }
            Err(err) => Err(ObjectStoreError::request("get_bucket_policy", err)),
        }
    }

    async fn set_bucket_policy(&self, bucket: &str, document: &str) -> Result<()> {
        debug!(bucket, "put_bucket_policy");
        self.inner
            .put_bucket_policy()
            .bucket(bucket)
            .policy(document)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("put_bucket_policy", err))?;
        Ok(())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expiry: Duration,
    ) -> Result<Url> {
        debug!(bucket, key, %method, expiry_secs = expiry.as_secs(), "presign");
        let presigning = PresigningConfig::expires_in(expiry)
            .map_err(|err| ObjectStoreError::request("presign", err))?;

        let request = match method {
            PresignMethod::Get => self
                .inner
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|err| ObjectStoreError::request("presign_get_object", err))?,
            PresignMethod::Put => self
                .inner
                .put_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|err| ObjectStoreError::request("presign_put_object", err))?,
        };
        Ok(Url::parse(request.uri())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future;
    use std::sync::{Arc, Mutex};

    fn entry(name: &str) -> ObjectEntry {
        ObjectEntry {
            name: name.to_string(),
            size: 1,
            last_modified: DateTime::default(),
        }
    }

    #[test]
    fn next_token_only_for_truncated_pages() {
        assert_eq!(next_token(Some(true), Some("t1")).as_deref(), Some("t1"));
        assert_eq!(next_token(Some(false), Some("t1")), None);
        assert_eq!(next_token(None, Some("t1")), None);
        assert_eq!(next_token(Some(true), None), None);
        assert_eq!(next_token(Some(true), Some("")), None);
    }

    #[test]
    fn missing_policy_code_maps_to_empty_document() {
        assert!(is_missing_policy(Some("NoSuchBucketPolicy")));
        assert!(!is_missing_policy(Some("NoSuchBucket")));
        assert!(!is_missing_policy(Some("AccessDenied")));
        assert!(!is_missing_policy(None));
    }

    #[tokio::test]
    async fn paginate_follows_continuation_tokens() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let listing = paginate(move |token: Option<String>| {
            recorder.lock().unwrap().push(token.clone());
            let page = match token.as_deref() {
                None => Page {
                    entries: vec![entry("a.txt")],
                    next: Some("t1".into()),
                },
                Some("t1") => Page {
                    entries: vec![entry("b.txt"), entry("c.txt")],
                    next: Some("t2".into()),
                },
                _ => Page {
                    entries: vec![entry("d.txt")],
                    next: None,
                },
            };
            future::ready(Ok(page))
        });

        let names: Vec<String> = listing.map_ok(|e| e.name).try_collect().await.unwrap();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt", "d.txt"]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn paginate_handles_empty_pages() {
        let listing = paginate(|token: Option<String>| {
            let page = match token {
                None => Page {
                    entries: Vec::new(),
                    next: Some("t1".into()),
                },
                Some(_) => Page {
                    entries: vec![entry("late.txt")],
                    next: None,
                },
            };
            future::ready(Ok(page))
        });

        let names: Vec<String> = listing.map_ok(|e| e.name).try_collect().await.unwrap();
        assert_eq!(names, ["late.txt"]);
    }

    #[tokio::test]
    async fn paginate_stops_at_failed_page() {
        let mut listing = paginate(|token: Option<String>| {
            future::ready(match token {
                None => Ok(Page {
                    entries: vec![entry("a.txt")],
                    next: Some("t1".into()),
                }),
                Some(_) => Err(ObjectStoreError::request(
                    "list_objects_v2",
                    std::io::Error::other("connection reset"),
                )),
            })
        });

        assert_eq!(listing.try_next().await.unwrap().map(|e| e.name).as_deref(), Some("a.txt"));
        let err = listing.try_next().await.unwrap_err();
        assert_eq!(err.operation(), Some("list_objects_v2"));
    }

    #[test]
    fn listing_entries_convert_sdk_objects() {
        let object = Object::builder()
            .key("docs/a.txt")
            .size(42)
            .last_modified(AwsDateTime::from_secs(1_700_000_000))
            .build();
        let entry = to_entry(&object);
        assert_eq!(entry.name, "docs/a.txt");
        assert_eq!(entry.size, 42);
        assert_eq!(entry.last_modified.timestamp(), 1_700_000_000);

        let bare = to_entry(&Object::builder().size(-1).build());
        assert_eq!(bare.name, "");
        assert_eq!(bare.size, 0);
    }
}
