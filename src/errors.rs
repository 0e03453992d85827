//! Error type shared by every facade operation.
//!
//! All failures, whether they come from configuration, caller input or the
//! underlying storage client, are reported as an [`ObjectStoreError`].

use std::{error::Error as StdError, io, path::PathBuf};
use thiserror::Error;

/// Boxed cause carried by transport failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to connect to object storage at {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("malformed endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("unsupported bucket policy `{0}`")]
    UnsupportedPolicy(String),
    #[error("illegal path: {0}")]
    IllegalPath(String),
    #[error("path `{}` is a directory", .0.display())]
    PathIsDirectory(PathBuf),
    #[error("no such file `{filename}` in bucket `{bucket}`")]
    NoSuchFile { bucket: String, filename: String },
    #[error("object storage request `{operation}` failed")]
    Request {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type Result<T, E = ObjectStoreError> = std::result::Result<T, E>;

impl ObjectStoreError {
    /// Wrap a failure reported by the storage client.
    pub fn request(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Request {
            operation,
            source: source.into(),
        }
    }

    /// Shortcut for [`ObjectStoreError::IllegalPath`].
    pub fn illegal_path(msg: impl Into<String>) -> Self {
        Self::IllegalPath(msg.into())
    }

    /// Shortcut for [`ObjectStoreError::NoSuchFile`].
    pub fn no_such_file(bucket: &str, filename: &str) -> Self {
        Self::NoSuchFile {
            bucket: bucket.to_string(),
            filename: filename.to_string(),
        }
    }

    /// Name of the client operation that failed, for transport failures.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Request { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
