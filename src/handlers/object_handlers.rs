//! Object commands. Without `--bucket` they go through the default-bucket
//! facade; downloads without `--output` stream to stdout.

use super::{AppContext, print_json};
use anyhow::{Context, Result};
use futures::StreamExt;
use minio_template::{DEFAULT_URL_EXPIRY, StoredFile};
use serde::Serialize;
use std::{path::Path, time::Duration};
use tokio::io::{self, AsyncWriteExt};
use url::Url;

#[derive(Serialize)]
struct UrlResponse<'a> {
    bucket: &'a str,
    filename: &'a str,
    url: Url,
}

#[derive(Serialize)]
struct DownloadResponse<'a> {
    bucket: &'a str,
    filename: &'a str,
    path: &'a Path,
}

#[derive(Serialize)]
struct DeleteResponse<'a> {
    bucket: &'a str,
    deleted: &'a [String],
}

/// `ls [--bucket] [--prefix] [--batched]`
pub async fn list_files(
    ctx: &AppContext,
    bucket: Option<&str>,
    prefix: Option<&str>,
    batched: bool,
) -> Result<()> {
    let files: Vec<StoredFile> = match (bucket, batched) {
        (Some(bucket), true) => ctx.store.list_files_batched(bucket, prefix).await?,
        (Some(bucket), false) => match prefix {
            Some(prefix) => ctx.store.list_files_with_prefix(bucket, prefix).await?,
            None => ctx.store.list_files(bucket).await?,
        },
        (None, true) => ctx.default_bucket().await?.list_files_batched(prefix).await?,
        (None, false) => {
            let facade = ctx.default_bucket().await?;
            match prefix {
                Some(prefix) => facade.list_files_with_prefix(prefix).await?,
                None => facade.list_files().await?,
            }
        }
    };
    print_json(&files)
}

/// `put <local> [--bucket] [--key] [--content-type]`
pub async fn put_file(
    ctx: &AppContext,
    local: &Path,
    bucket: Option<&str>,
    key: Option<&str>,
    content_type: Option<&str>,
) -> Result<()> {
    let bucket = resolve_bucket(ctx, bucket).await?;
    let key = match key {
        Some(key) => key.to_string(),
        None => local
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("`{}` does not name a file", local.display()))?,
    };

    let url = ctx
        .store
        .upload_file_with(&bucket, &key, local, content_type)
        .await?;

    print_json(&UrlResponse {
        bucket: &bucket,
        filename: &key,
        url,
    })
}

/// `get <name> [--bucket] [--output]`
pub async fn get_file(
    ctx: &AppContext,
    name: &str,
    bucket: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let bucket = resolve_bucket(ctx, bucket).await?;
    match output {
        Some(path) => {
            ctx.store.download_file_to(&bucket, name, path).await?;
            print_json(&DownloadResponse {
                bucket: &bucket,
                filename: name,
                path,
            })
        }
        None => {
            let mut body = ctx.store.download_file(&bucket, name).await?;
            let mut stdout = io::stdout();
            while let Some(chunk) = body.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
            Ok(())
        }
    }
}

/// `cp <source> <target> [--bucket] [--target-bucket]`
pub async fn copy_file(
    ctx: &AppContext,
    source: &str,
    target: &str,
    bucket: Option<&str>,
    target_bucket: Option<&str>,
) -> Result<()> {
    let (target_bucket, url) = match (bucket, target_bucket) {
        (None, None) => {
            let facade = ctx.default_bucket().await?;
            let url = facade.copy_file(source, target).await?;
            (facade.bucket().to_string(), url)
        }
        (None, Some(target_bucket)) => {
            let facade = ctx.default_bucket().await?;
            let url = facade.copy_file_to(source, target_bucket, target).await?;
            (target_bucket.to_string(), url)
        }
        (Some(bucket), target_bucket) => {
            let target_bucket = target_bucket.unwrap_or(bucket);
            let url = ctx
                .store
                .copy_file(bucket, source, target_bucket, target)
                .await?;
            (target_bucket.to_string(), url)
        }
    };
    print_json(&UrlResponse {
        bucket: &target_bucket,
        filename: target,
        url,
    })
}

/// `rm <names...> [--bucket]`
pub async fn remove_files(ctx: &AppContext, names: &[String], bucket: Option<&str>) -> Result<()> {
    let bucket = match bucket {
        Some(bucket) => {
            ctx.store.delete_files(bucket, names).await?;
            bucket.to_string()
        }
        None => {
            let facade = ctx.default_bucket().await?;
            facade.delete_files(names).await?;
            facade.bucket().to_string()
        }
    };
    print_json(&DeleteResponse {
        bucket: &bucket,
        deleted: names,
    })
}

/// `url <name> [--bucket] [--expires-secs]`
pub async fn file_url(
    ctx: &AppContext,
    name: &str,
    bucket: Option<&str>,
    expires_secs: Option<u64>,
) -> Result<()> {
    let expiry = expires_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_URL_EXPIRY);
    let bucket = resolve_bucket(ctx, bucket).await?;
    let url = ctx
        .store
        .get_file_url_with_expiry(&bucket, name, expiry)
        .await?;
    print_json(&UrlResponse {
        bucket: &bucket,
        filename: name,
        url,
    })
}

async fn resolve_bucket(ctx: &AppContext, bucket: Option<&str>) -> Result<String> {
    match bucket {
        Some(bucket) => Ok(bucket.to_string()),
        None => Ok(ctx.default_bucket().await?.bucket().to_string()),
    }
}
