//! Bucket commands: list, create, remove and policy management.

use super::{AppContext, print_json};
use anyhow::Result;
use minio_template::AccessPolicy;
use serde::Serialize;

#[derive(Serialize)]
struct BucketPolicyResponse<'a> {
    bucket: &'a str,
    shared: bool,
    policy: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct BucketChangeResponse<'a> {
    bucket: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<AccessPolicy>,
}

/// `buckets [--prefix]`
pub async fn list_buckets(ctx: &AppContext, prefix: Option<&str>) -> Result<()> {
    let buckets = match prefix {
        Some(prefix) => {
            ctx.store
                .list_buckets_matching(|b| b.name.starts_with(prefix))
                .await?
        }
        None => ctx.store.list_buckets().await?,
    };
    print_json(&buckets)
}

/// `make-bucket <name> [--policy]`
pub async fn make_bucket(ctx: &AppContext, name: &str, policy: AccessPolicy) -> Result<()> {
    ctx.store.create_bucket_with_policy(name, policy).await?;
    print_json(&BucketChangeResponse {
        bucket: name,
        status: "created",
        policy: Some(policy),
    })
}

/// `remove-bucket <name>`
pub async fn remove_bucket(ctx: &AppContext, name: &str) -> Result<()> {
    ctx.store.delete_bucket(name).await?;
    print_json(&BucketChangeResponse {
        bucket: name,
        status: "removed",
        policy: None,
    })
}

/// `set-policy <policy> [--bucket]`
pub async fn set_policy(
    ctx: &AppContext,
    policy: AccessPolicy,
    bucket: Option<&str>,
) -> Result<()> {
    let name = match bucket {
        Some(bucket) => {
            ctx.store.set_bucket_policy(bucket, policy).await?;
            bucket.to_string()
        }
        None => {
            let facade = ctx.default_bucket().await?;
            facade.set_bucket_policy(policy).await?;
            facade.bucket().to_string()
        }
    };
    print_json(&BucketChangeResponse {
        bucket: &name,
        status: "policy-applied",
        policy: Some(policy),
    })
}

/// `policy [--bucket]`
pub async fn show_policy(ctx: &AppContext, bucket: Option<&str>) -> Result<()> {
    let (name, document, shared) = match bucket {
        Some(bucket) => (
            bucket.to_string(),
            ctx.store.get_bucket_policy(bucket).await?,
            ctx.store.is_bucket_shared(bucket).await?,
        ),
        None => {
            let facade = ctx.default_bucket().await?;
            (
                facade.bucket().to_string(),
                facade.get_bucket_policy().await?,
                facade.is_bucket_shared().await?,
            )
        }
    };

    // Non-JSON documents are printed as a plain string.
    let policy = match document.trim() {
        "" => None,
        raw => Some(
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.into())),
        ),
    };
    print_json(&BucketPolicyResponse {
        bucket: &name,
        shared,
        policy,
    })
}
