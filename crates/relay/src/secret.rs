//! Resolution of secret references into key/value sets.
//!
//! A reference is `env:NAME` (the variable holds a JSON object), or
//! `file:PATH` / a bare path (the file holds a JSON object). Values must be
//! strings.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::timeout;

use crate::{Error, Result};

const READ_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn resolve(reference: &str) -> Result<HashMap<String, String>> {
    resolve_with(reference, |name| std::env::var(name).ok()).await
}

pub async fn resolve_with<F>(reference: &str, lookup: F) -> Result<HashMap<String, String>>
where
    F: Fn(&str) -> Option<String>,
{
    let reference = reference.trim();
    let content = if let Some(name) = reference.strip_prefix("env:") {
        lookup(name).unwrap_or_default()
    } else {
        let path = reference.strip_prefix("file:").unwrap_or(reference);
        if path.is_empty() {
            return Err(Error::Secret("no secret or secret is empty".to_string()));
        }
        timeout(READ_TIMEOUT, tokio::fs::read_to_string(path))
            .await
            .map_err(|_| Error::Timeout {
                operation: "read secret",
                timeout_ms: READ_TIMEOUT.as_millis(),
            })??
    };

    if content.trim().is_empty() {
        return Err(Error::Secret("no secret or secret is empty".to_string()));
    }

    serde_json::from_str(&content)
        .map_err(|e| Error::Secret(format!("{} is not a JSON object of strings: {}", reference, e)))
}
