//! Canned bucket policies and the "shared bucket" predicate.
//!
//! A bucket policy is an S3 authorization document. Three canned documents
//! are supported, each rendered for a single bucket by substituting the
//! bucket name into a fixed template. Whether an existing document makes the
//! bucket *shared* (public read and write) is decided by [`SharedPolicyCheck`].

use crate::errors::{ObjectStoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// Placeholder replaced by the bucket name when rendering a template.
pub const BUCKET_PLACEHOLDER: &str = "${bucket}";

const READ_ONLY_TEMPLATE: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":["*"]},"Action":["s3:GetBucketLocation","s3:ListBucket"],"Resource":["arn:aws:s3:::${bucket}"]},{"Effect":"Allow","Principal":{"AWS":["*"]},"Action":["s3:GetObject"],"Resource":["arn:aws:s3:::${bucket}/*"]}]}"#;

const WRITE_ONLY_TEMPLATE: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":["*"]},"Action":["s3:GetBucketLocation","s3:ListBucketMultipartUploads"],"Resource":["arn:aws:s3:::${bucket}"]},{"Effect":"Allow","Principal":{"AWS":["*"]},"Action":["s3:AbortMultipartUpload","s3:DeleteObject","s3:ListMultipartUploadParts","s3:PutObject"],"Resource":["arn:aws:s3:::${bucket}/*"]}]}"#;

const READ_WRITE_TEMPLATE: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":["*"]},"Action":["s3:GetBucketLocation","s3:ListBucket","s3:ListBucketMultipartUploads"],"Resource":["arn:aws:s3:::${bucket}"]},{"Effect":"Allow","Principal":{"AWS":["*"]},"Action":["s3:DeleteObject","s3:GetObject","s3:ListMultipartUploadParts","s3:PutObject","s3:AbortMultipartUpload"],"Resource":["arn:aws:s3:::${bucket}/*"]}]}"#;

/// Every action granted by the read-and-write template.
pub const SHARED_ACTIONS: [&str; 8] = [
    "GetBucketLocation",
    "ListBucketMultipartUploads",
    "ListBucket",
    "DeleteObject",
    "GetObject",
    "AbortMultipartUpload",
    "PutObject",
    "ListMultipartUploadParts",
];

/// Canned access policy applied to a bucket.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    /// Anonymous listing and download.
    ReadOnly,
    /// Anonymous upload and delete, no download.
    WriteOnly,
    /// Anonymous listing, download, upload and delete.
    #[default]
    ReadAndWrite,
}

impl AccessPolicy {
    pub const ALL: [AccessPolicy; 3] = [Self::ReadOnly, Self::WriteOnly, Self::ReadAndWrite];

    fn template(self) -> &'static str {
        match self {
            Self::ReadOnly => READ_ONLY_TEMPLATE,
            Self::WriteOnly => WRITE_ONLY_TEMPLATE,
            Self::ReadAndWrite => READ_WRITE_TEMPLATE,
        }
    }

    /// Render the authorization document of this policy for `bucket`.
    pub fn render(self, bucket: &str) -> String {
        self.template().replace(BUCKET_PLACEHOLDER, bucket)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WriteOnly => "write-only",
            Self::ReadAndWrite => "read-and-write",
        }
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessPolicy {
    type Err = ObjectStoreError;

    /// Accepts `read-only`, `READ_ONLY`, `readonly` and the like.
    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "readonly" => Ok(Self::ReadOnly),
            "writeonly" => Ok(Self::WriteOnly),
            "readandwrite" | "readwrite" => Ok(Self::ReadAndWrite),
            _ => Err(ObjectStoreError::UnsupportedPolicy(s.to_string())),
        }
    }
}

/// Render the document of `policy` for `bucket`.
pub fn render(bucket: &str, policy: AccessPolicy) -> String {
    policy.render(bucket)
}

/// Heuristic shared-bucket test: the document mentions every action of the
/// read-and-write template, anywhere in its text.
pub fn is_shared(document: &str) -> bool {
    !document.trim().is_empty() && SHARED_ACTIONS.iter().all(|action| document.contains(action))
}

/// Structural shared-bucket test: the document parses as a policy whose
/// public `Allow` statements together grant every action of the
/// read-and-write template.
pub fn is_shared_structural(document: &str) -> bool {
    let Ok(policy) = serde_json::from_str::<Value>(document) else {
        return false;
    };
    let statements = match policy.get("Statement") {
        Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => return false,
    };

    let mut granted: Vec<String> = Vec::new();
    for statement in statements {
        if statement.get("Effect").and_then(Value::as_str) != Some("Allow") {
            continue;
        }
        if !is_public_principal(statement.get("Principal")) {
            continue;
        }
        granted.extend(string_or_list(statement.get("Action")));
    }

    if granted.iter().any(|a| a == "*" || a == "s3:*") {
        return true;
    }
    SHARED_ACTIONS
        .iter()
        .all(|action| granted.iter().any(|g| g.strip_prefix("s3:") == Some(*action)))
}

fn is_public_principal(principal: Option<&Value>) -> bool {
    match principal {
        Some(Value::String(s)) => s == "*",
        Some(Value::Object(map)) => map
            .get("AWS")
            .map(|aws| string_or_list(Some(aws)).iter().any(|p| p == "*"))
            .unwrap_or(false),
        _ => false,
    }
}

fn string_or_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// How an existing bucket policy is classified as shared.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SharedPolicyCheck {
    /// Substring test over the raw document. Compatible with documents
    /// written by other tools that only approximate the canned templates.
    #[default]
    Heuristic,
    /// JSON parse of the document, see [`is_shared_structural`].
    Structural,
}

impl SharedPolicyCheck {
    pub fn is_shared(self, document: &str) -> bool {
        match self {
            Self::Heuristic => is_shared(document),
            Self::Structural => is_shared_structural(document),
        }
    }
}
