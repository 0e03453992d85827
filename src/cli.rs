//! Command-line surface of the `minio-template` binary.
//!
//! Connection settings come from `MINIO_*` environment variables and can be
//! overridden with the global flags of [`ConfigArgs`]. Commands that take an
//! optional `--bucket` fall back to the configured default bucket.

use clap::{Parser, Subcommand};
use minio_template::{AccessPolicy, ConfigArgs};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "minio-template",
    version,
    about = "Work with buckets and objects on a MinIO server"
)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the server answers a bucket listing.
    Health,

    /// List buckets.
    Buckets {
        /// Only buckets whose name starts with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Create a bucket.
    MakeBucket {
        name: String,
        #[arg(long, default_value_t = AccessPolicy::ReadAndWrite)]
        policy: AccessPolicy,
    },

    /// Delete a bucket together with every object in it.
    RemoveBucket { name: String },

    /// Apply a canned access policy to a bucket.
    SetPolicy {
        policy: AccessPolicy,
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Print the policy document of a bucket and whether it is shared.
    Policy {
        #[arg(long)]
        bucket: Option<String>,
    },

    /// List objects.
    Ls {
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        /// Read the bucket policy once instead of once per object.
        #[arg(long)]
        batched: bool,
    },

    /// Upload a local file.
    Put {
        local: PathBuf,
        #[arg(long)]
        bucket: Option<String>,
        /// Object name; defaults to the local file name.
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download an object to a file, or to stdout without `--output`.
    Get {
        name: String,
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Copy an object.
    Cp {
        source: String,
        target: String,
        #[arg(long)]
        bucket: Option<String>,
        /// Defaults to the source bucket.
        #[arg(long)]
        target_bucket: Option<String>,
    },

    /// Delete objects.
    Rm {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Print the access URL of an object.
    Url {
        name: String,
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        expires_secs: Option<u64>,
    },
}
