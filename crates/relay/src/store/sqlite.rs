use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tracing::{debug, error, info};

use crate::{
    store::{
        models::{expire_on, from_millis, now_millis},
        KvStore, LeaseKey, LeaseRecord, PutOutcome,
    },
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(path: &str) -> Result<Self> {
        info!("Connecting to SQLite database: {}", path);

        let options = if path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .busy_timeout(Duration::from_secs(1))
        };

        // A single connection serializes writers in-process and keeps
        // :memory: pointing at one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn create_if_absent(
        &self,
        key: &LeaseKey,
        record: &LeaseRecord,
        ttl: Duration,
    ) -> Result<PutOutcome> {
        debug!("Creating lease if absent: {}", key);

        // An expired row is taken over in the same statement, so the
        // check and the write cannot interleave with another caller.
        let result = sqlx::query(
            r#"
            INSERT INTO leases (topic, id, thread_ts, message_ts, created_at, expire_on)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(topic, id) DO UPDATE SET
                thread_ts = excluded.thread_ts,
                message_ts = excluded.message_ts,
                created_at = excluded.created_at,
                expire_on = excluded.expire_on
            WHERE leases.expire_on <= ?7
            "#,
        )
        .bind(&key.topic)
        .bind(&key.id)
        .bind(&record.thread_ts)
        .bind(&record.message_ts)
        .bind(record.created_at.timestamp_millis())
        .bind(expire_on(ttl))
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            PutOutcome::AlreadyExists
        } else {
            PutOutcome::Created
        })
    }

    async fn get(&self, key: &LeaseKey) -> Result<Option<LeaseRecord>> {
        debug!("Getting lease: {}", key);

        let row = sqlx::query(
            r#"
            SELECT thread_ts, message_ts, created_at
            FROM leases
            WHERE topic = ?1 AND id = ?2 AND expire_on > ?3
            "#,
        )
        .bind(&key.topic)
        .bind(&key.id)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| LeaseRecord {
            thread_ts: r.get("thread_ts"),
            message_ts: r.get("message_ts"),
            created_at: from_millis(r.get("created_at")),
        }))
    }

    async fn put(&self, key: &LeaseKey, record: &LeaseRecord, ttl: Duration) -> Result<()> {
        debug!("Putting lease: {}", key);

        sqlx::query(
            r#"
            INSERT INTO leases (topic, id, thread_ts, message_ts, created_at, expire_on)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(topic, id) DO UPDATE SET
                thread_ts = excluded.thread_ts,
                message_ts = excluded.message_ts,
                created_at = excluded.created_at,
                expire_on = excluded.expire_on
            "#,
        )
        .bind(&key.topic)
        .bind(&key.id)
        .bind(&record.thread_ts)
        .bind(&record.message_ts)
        .bind(record.created_at.timestamp_millis())
        .bind(expire_on(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM leases WHERE expire_on <= ?1")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
