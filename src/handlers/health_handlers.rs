//! Connectivity check.
//!
//! `health` builds a client from the configuration and issues the same
//! bucket listing used as the startup self-test. The report is printed in
//! both cases; a failed check also makes the command fail.

use super::print_json;
use anyhow::{Result, bail};
use minio_template::{MinioConfig, S3Client};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    endpoint: Option<String>,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn from_result<T, E: std::fmt::Display>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self {
                ok: true,
                error: None,
            },
            Err(err) => Self {
                ok: false,
                error: Some(err.to_string()),
            },
        }
    }
}

/// `health`
pub async fn health(config: &MinioConfig) -> Result<()> {
    let mut checks = HashMap::new();

    let client = S3Client::new(config);
    checks.insert("config", CheckStatus::from_result(&client));

    let endpoint = client.as_ref().ok().map(|c| c.endpoint().to_string());
    if let Ok(client) = &client {
        let connectivity = client.check_connection().await;
        checks.insert("connectivity", CheckStatus::from_result(&connectivity));
    }

    let overall_ok = checks.len() == 2 && checks.values().all(|c| c.ok);
    print_json(&HealthResponse {
        status: if overall_ok { "ok" } else { "error" },
        endpoint,
        checks,
    })?;

    if !overall_ok {
        bail!("object storage is not reachable");
    }
    Ok(())
}
