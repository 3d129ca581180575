mod config;
mod factory;
mod lease;
mod memory;
mod models;
mod postgres;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use lease::{LeaseStore, LOCK_TTL, MESSAGE_TTL, STORE_TIMEOUT, THREAD_TTL};
pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use std::time::Duration;

use async_trait::async_trait;

/// Key-value backend holding time-bounded records.
///
/// Expired records behave exactly like absent ones for every operation.
#[async_trait]
pub trait KvStore: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    /// Atomically writes `record` unless a live record exists under `key`.
    /// An existing record is reported as [`PutOutcome::AlreadyExists`], not
    /// as an error.
    async fn create_if_absent(
        &self,
        key: &LeaseKey,
        record: &LeaseRecord,
        ttl: Duration,
    ) -> crate::Result<PutOutcome>;

    async fn get(&self, key: &LeaseKey) -> crate::Result<Option<LeaseRecord>>;

    // Unconditional upsert
    async fn put(&self, key: &LeaseKey, record: &LeaseRecord, ttl: Duration) -> crate::Result<()>;

    /// Drops expired records, returning how many were removed.
    async fn purge_expired(&self) -> crate::Result<u64>;
}
