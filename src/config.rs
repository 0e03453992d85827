//! Connection configuration.
//!
//! Values come from `MINIO_*` environment variables and may be overridden
//! on the command line through [`ConfigArgs`]. Embedding applications can
//! also deserialize a [`MinioConfig`] from their own configuration files.

use crate::{
    errors::{ObjectStoreError, Result},
    models::SharedPolicyCheck,
};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::{env, fmt, str::FromStr};
use url::Url;

const ENV_URL: &str = "MINIO_URL";
const ENV_HOST: &str = "MINIO_HOST";
const ENV_PORT: &str = "MINIO_PORT";
const ENV_SECURE: &str = "MINIO_SECURE";
const ENV_USERNAME: &str = "MINIO_USERNAME";
const ENV_PASSWORD: &str = "MINIO_PASSWORD";
const ENV_REGION: &str = "MINIO_REGION";
const ENV_CONNECT_TIMEOUT: &str = "MINIO_CONNECT_TIMEOUT_MS";
const ENV_WRITE_TIMEOUT: &str = "MINIO_WRITE_TIMEOUT_MS";
const ENV_READ_TIMEOUT: &str = "MINIO_READ_TIMEOUT_MS";
const ENV_DEFAULT_BUCKET: &str = "MINIO_DEFAULT_BUCKET";
const ENV_STRICT_POLICY: &str = "MINIO_STRICT_POLICY_CHECK";

/// Settings needed to reach a MinIO server.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioConfig {
    /// Full endpoint URL. Takes precedence over `host`/`port`/`secure`.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Use HTTPS when building the endpoint from `host` and `port`.
    pub secure: bool,
    /// Access key.
    pub username: String,
    /// Secret key.
    #[serde(skip_serializing)]
    pub password: String,
    pub region: String,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Bucket used by the default-bucket facade.
    pub default_bucket: String,
    /// Classify shared buckets by parsing their policy instead of by
    /// substring matching.
    pub strict_policy_check: bool,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".into(),
            port: 9000,
            secure: false,
            username: String::new(),
            password: String::new(),
            region: "us-east-1".into(),
            connect_timeout_ms: 10_000,
            write_timeout_ms: 60_000,
            read_timeout_ms: 10_000,
            default_bucket: String::new(),
            strict_policy_check: false,
        }
    }
}

impl fmt::Debug for MinioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinioConfig")
            .field("url", &self.url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &"***")
            .field("region", &self.region)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("default_bucket", &self.default_bucket)
            .field("strict_policy_check", &self.strict_policy_check)
            .finish()
    }
}

/// Command-line overrides for [`MinioConfig`].
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Endpoint URL (overrides MINIO_URL)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Server host (overrides MINIO_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port (overrides MINIO_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Connect over HTTPS (overrides MINIO_SECURE)
    #[arg(long, global = true)]
    pub secure: bool,

    /// Access key (overrides MINIO_USERNAME)
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Secret key (overrides MINIO_PASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Region (overrides MINIO_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Default bucket (overrides MINIO_DEFAULT_BUCKET)
    #[arg(long, global = true)]
    pub default_bucket: Option<String>,

    /// Parse bucket policies to decide whether a bucket is shared
    #[arg(long, global = true)]
    pub strict_policy_check: bool,
}

impl MinioConfig {
    /// Read the configuration from `MINIO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults
    /// for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        cfg.url = get(ENV_URL);
        if let Some(host) = get(ENV_HOST) {
            cfg.host = host;
        }
        if let Some(port) = parse_var(ENV_PORT, get(ENV_PORT))? {
            cfg.port = port;
        }
        if let Some(secure) = parse_bool(ENV_SECURE, get(ENV_SECURE))? {
            cfg.secure = secure;
        }
        if let Some(username) = get(ENV_USERNAME) {
            cfg.username = username;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            cfg.password = password;
        }
        if let Some(region) = get(ENV_REGION) {
            cfg.region = region;
        }
        if let Some(ms) = parse_var(ENV_CONNECT_TIMEOUT, get(ENV_CONNECT_TIMEOUT))? {
            cfg.connect_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(ENV_WRITE_TIMEOUT, get(ENV_WRITE_TIMEOUT))? {
            cfg.write_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(ENV_READ_TIMEOUT, get(ENV_READ_TIMEOUT))? {
            cfg.read_timeout_ms = ms;
        }
        if let Some(bucket) = get(ENV_DEFAULT_BUCKET) {
            cfg.default_bucket = bucket;
        }
        if let Some(strict) = parse_bool(ENV_STRICT_POLICY, get(ENV_STRICT_POLICY))? {
            cfg.strict_policy_check = strict;
        }
        Ok(cfg)
    }

    /// Environment first, then command-line overrides on top.
    pub fn from_env_and_args(args: &ConfigArgs) -> Result<Self> {
        let mut cfg = Self::from_env()?;
        cfg.apply_args(args);
        Ok(cfg)
    }

    pub fn apply_args(&mut self, args: &ConfigArgs) {
        if let Some(url) = &args.url {
            self.url = Some(url.clone());
        }
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if args.secure {
            self.secure = true;
        }
        if let Some(username) = &args.username {
            self.username = username.clone();
        }
        if let Some(password) = &args.password {
            self.password = password.clone();
        }
        if let Some(region) = &args.region {
            self.region = region.clone();
        }
        if let Some(bucket) = &args.default_bucket {
            self.default_bucket = bucket.clone();
        }
        if args.strict_policy_check {
            self.strict_policy_check = true;
        }
    }

    /// Reject configurations that cannot possibly connect.
    pub fn validate(&self) -> Result<()> {
        if is_blank(self.url.as_deref()) && self.host.trim().is_empty() {
            return Err(ObjectStoreError::Config(
                "either url or host must be set".into(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(ObjectStoreError::Config("username cannot be empty".into()));
        }
        if self.password.trim().is_empty() {
            return Err(ObjectStoreError::Config("password cannot be empty".into()));
        }
        if self.default_bucket.trim().is_empty() {
            return Err(ObjectStoreError::Config(
                "default bucket cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the endpoint URL: `url` when set, otherwise built from
    /// `host`, `port` and `secure`.
    pub fn endpoint(&self) -> Result<Url> {
        let raw = match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                let scheme = if self.secure { "https" } else { "http" };
                format!("{}://{}:{}", scheme, self.host.trim(), self.port)
            }
        };

        let endpoint = Url::parse(&raw).map_err(|err| ObjectStoreError::InvalidEndpoint {
            endpoint: raw.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(ObjectStoreError::InvalidEndpoint {
                endpoint: raw,
                reason: "expected an http or https url with a host".into(),
            });
        }
        Ok(endpoint)
    }

    pub fn shared_policy_check(&self) -> SharedPolicyCheck {
        if self.strict_policy_check {
            SharedPolicyCheck::Structural
        } else {
            SharedPolicyCheck::Heuristic
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|err| {
                ObjectStoreError::Config(format!("parsing {key} value `{raw}`: {err}"))
            })
        })
        .transpose()
}

fn parse_bool(key: &str, value: Option<String>) -> Result<Option<bool>> {
    value
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ObjectStoreError::Config(format!(
                "parsing {key} value `{raw}`: expected a boolean"
            ))),
        })
        .transpose()
}
