use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::{
    store::{KvStore, LeaseKey, LeaseRecord, PutOutcome},
    Error, Result,
};

/// Lifetime of the dedup lock. Released by expiry only.
pub const LOCK_TTL: Duration = Duration::from_secs(1);
/// Lifetime of a thread record before the thread is considered stale.
pub const THREAD_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Lifetime of a delivered record.
pub const MESSAGE_TTL: Duration = THREAD_TTL;
/// Upper bound on every backend call, independent of the caller's deadline.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lock, thread and delivered records on top of a [`KvStore`].
#[derive(Clone)]
pub struct LeaseStore {
    kv: Arc<dyn KvStore>,
    timeout: Duration,
}

impl LeaseStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            timeout: STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Creates a lock record for `(topic, id)`. Returns `false` when a live
    /// record already exists.
    pub async fn try_acquire(&self, topic: &str, id: &str, ttl: Duration) -> Result<bool> {
        let key = LeaseKey::new(topic, id);
        let record = LeaseRecord::lock();

        let outcome = self
            .bounded("lock", &key, self.kv.create_if_absent(&key, &record, ttl))
            .await?;

        debug!("Lock on {} -> {:?}", key, outcome);
        Ok(outcome == PutOutcome::Created)
    }

    pub async fn get_thread_ts(&self, topic: &str, thread_id: &str) -> Result<Option<String>> {
        let key = LeaseKey::new(topic, thread_id);
        let record = self.bounded("get thread", &key, self.kv.get(&key)).await?;
        Ok(record.and_then(|r| r.thread_ts).filter(|ts| !ts.is_empty()))
    }

    pub async fn set_thread_ts(
        &self,
        topic: &str,
        thread_id: &str,
        thread_ts: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = LeaseKey::new(topic, thread_id);
        let record = LeaseRecord::thread(thread_ts);
        self.bounded("set thread", &key, self.kv.put(&key, &record, ttl))
            .await
    }

    /// Timestamp of an already delivered message with this content, if any.
    /// A bare lock record under the same key does not count.
    pub async fn get_message_ts(&self, topic: &str, message_id: &str) -> Result<Option<String>> {
        let key = LeaseKey::new(topic, message_id);
        let record = self.bounded("get message", &key, self.kv.get(&key)).await?;
        Ok(record.and_then(|r| r.message_ts).filter(|ts| !ts.is_empty()))
    }

    pub async fn set_message_ts(
        &self,
        topic: &str,
        message_id: &str,
        message_ts: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = LeaseKey::new(topic, message_id);
        let record = LeaseRecord::message(message_ts);
        self.bounded("set message", &key, self.kv.put(&key, &record, ttl))
            .await
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.kv.purge_expired().await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        key: &LeaseKey,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis(),
            }),
        };

        if let Err(e) = &result {
            error!(
                operation,
                topic = %key.topic,
                id = %key.id,
                error = %e,
                "Lease store call failed"
            );
        }
        result
    }
}
