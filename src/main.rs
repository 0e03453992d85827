use anyhow::Result;
use clap::Parser;
use minio_template::MinioConfig;
use tracing_subscriber::EnvFilter;

mod cli;
mod handlers;

use cli::{Cli, Command};
use handlers::{AppContext, bucket_handlers, health_handlers, object_handlers};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    // Logs go to stderr so command output on stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config ---
    let cli = Cli::parse();
    let cfg = MinioConfig::from_env_and_args(&cli.config)?;
    tracing::debug!("Running with config: {:?}", cfg);

    if let Command::Health = cli.command {
        return health_handlers::health(&cfg).await;
    }

    // --- Connect (fails fast on bad config or unreachable server) ---
    let store = minio_template::connect(&cfg).await?;
    let ctx = AppContext::new(cfg, store);

    match cli.command {
        Command::Health => Ok(()),
        Command::Buckets { prefix } => bucket_handlers::list_buckets(&ctx, prefix.as_deref()).await,
        Command::MakeBucket { name, policy } => {
            bucket_handlers::make_bucket(&ctx, &name, policy).await
        }
        Command::RemoveBucket { name } => bucket_handlers::remove_bucket(&ctx, &name).await,
        Command::SetPolicy { policy, bucket } => {
            bucket_handlers::set_policy(&ctx, policy, bucket.as_deref()).await
        }
        Command::Policy { bucket } => bucket_handlers::show_policy(&ctx, bucket.as_deref()).await,
        Command::Ls {
            bucket,
            prefix,
            batched,
        } => object_handlers::list_files(&ctx, bucket.as_deref(), prefix.as_deref(), batched).await,
        Command::Put {
            local,
            bucket,
            key,
            content_type,
        } => {
            object_handlers::put_file(
                &ctx,
                &local,
                bucket.as_deref(),
                key.as_deref(),
                content_type.as_deref(),
            )
            .await
        }
        Command::Get {
            name,
            bucket,
            output,
        } => object_handlers::get_file(&ctx, &name, bucket.as_deref(), output.as_deref()).await,
        Command::Cp {
            source,
            target,
            bucket,
            target_bucket,
        } => {
            object_handlers::copy_file(
                &ctx,
                &source,
                &target,
                bucket.as_deref(),
                target_bucket.as_deref(),
            )
            .await
        }
        Command::Rm { names, bucket } => {
            object_handlers::remove_files(&ctx, &names, bucket.as_deref()).await
        }
        Command::Url {
            name,
            bucket,
            expires_secs,
        } => object_handlers::file_url(&ctx, &name, bucket.as_deref(), expires_secs).await,
    }
}
