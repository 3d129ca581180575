use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    store::{
        models::{expire_on, now_millis},
        KvStore, LeaseKey, LeaseRecord, PutOutcome,
    },
    Result,
};

/// Process-local store. Only coordinates callers sharing one process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<LeaseKey, (LeaseRecord, i64)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        debug!("Using in-memory lease store");
        Ok(())
    }

    async fn create_if_absent(
        &self,
        key: &LeaseKey,
        record: &LeaseRecord,
        ttl: Duration,
    ) -> Result<PutOutcome> {
        let mut entries = self.entries.lock().await;
        let now = now_millis();

        if let Some((_, expires)) = entries.get(key) {
            if *expires > now {
                return Ok(PutOutcome::AlreadyExists);
            }
        }
        entries.insert(key.clone(), (record.clone(), expire_on(ttl)));
        Ok(PutOutcome::Created)
    }

    async fn get(&self, key: &LeaseKey) -> Result<Option<LeaseRecord>> {
        let entries = self.entries.lock().await;
        let now = now_millis();

        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(record, _)| record.clone()))
    }

    async fn put(&self, key: &LeaseKey, record: &LeaseRecord, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.clone(), (record.clone(), expire_on(ttl)));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let now = now_millis();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        Ok((before - entries.len()) as u64)
    }
}
