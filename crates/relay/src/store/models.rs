use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// Composite key of every lease record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseKey {
    pub topic: String,
    pub id: String,
}

impl LeaseKey {
    pub fn new(topic: &str, id: &str) -> Self {
        Self {
            topic: topic.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.id)
    }
}

// Lock records carry no timestamps; thread and delivered records carry one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub thread_ts: Option<String>,
    pub message_ts: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn lock() -> Self {
        Self {
            thread_ts: None,
            message_ts: None,
            created_at: Utc::now(),
        }
    }

    pub fn thread(ts: &str) -> Self {
        Self {
            thread_ts: Some(ts.to_string()),
            ..Self::lock()
        }
    }

    pub fn message(ts: &str) -> Self {
        Self {
            message_ts: Some(ts.to_string()),
            ..Self::lock()
        }
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn expire_on(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl)
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
