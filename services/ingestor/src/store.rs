//! Durable tick store
//!
//! The store is the source of truth for topic identities and price
//! rows; the in-memory cache in the writer is only an accelerator.
//! Any number of pipeline instances may hit the same store: topic
//! creation is an upsert that resolves concurrent creation to a
//! single winner, and price inserts are conflict-ignoring behind a
//! uniqueness constraint on (topic_id, received_at).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};
use types::topic::TopicMeta;

use crate::config::StoreConfig;

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("query error: {0}")]
    Query(#[from] tokio_postgres::Error),
}

/// One price row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRow {
    pub topic_id: i64,
    pub price: f64,
    pub received_at: DateTime<Utc>,
}

/// Persistence seam of the pipeline.
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Create tables and constraints if they do not exist.
    async fn init_schema(&self) -> Result<(), StoreError>;

    /// Map a topic to its durable integer identifier, creating the
    /// row on first sight. Concurrent creation of the same topic by
    /// multiple instances resolves to a single winner.
    async fn resolve_topic_id(&self, meta: &TopicMeta) -> Result<i64, StoreError>;

    /// Insert all rows in one all-or-nothing transaction. Returns the
    /// number of rows actually written (duplicates are ignored).
    async fn insert_ticks(&self, rows: &[TickRow]) -> Result<u64, StoreError>;
}

/// Logical schema of the store.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS topics (
    topic_id      BIGSERIAL PRIMARY KEY,
    topic_name    TEXT NOT NULL UNIQUE,
    index_name    TEXT,
    contract_type TEXT,
    strike        DOUBLE PRECISION,
    expiry        TEXT
);
CREATE TABLE IF NOT EXISTS price_ticks (
    topic_id    BIGINT NOT NULL REFERENCES topics (topic_id),
    price       DOUBLE PRECISION NOT NULL,
    received_at TIMESTAMPTZ NOT NULL,
    UNIQUE (topic_id, received_at)
);
";

const SELECT_TOPIC: &str = "SELECT topic_id FROM topics WHERE topic_name = $1";

/// `DO UPDATE` instead of `DO NOTHING` so the statement returns the
/// winning row even when another instance created it first.
const UPSERT_TOPIC: &str = "
INSERT INTO topics (topic_name, index_name, contract_type, strike, expiry)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (topic_name) DO UPDATE SET topic_name = EXCLUDED.topic_name
RETURNING topic_id
";

const INSERT_TICK: &str = "
INSERT INTO price_ticks (topic_id, price, received_at)
VALUES ($1, $2, $3)
ON CONFLICT (topic_id, received_at) DO NOTHING
";

/// Postgres-backed tick store over a pooled connection.
pub struct PgTickStore {
    pool: Pool,
}

impl PgTickStore {
    /// Build the connection pool. Does not touch the network until the
    /// first query.
    pub fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut pool_config = PoolConfig::new();
        pool_config.host = Some(config.host.clone());
        pool_config.port = Some(config.port);
        pool_config.user = Some(config.user.clone());
        pool_config.password = Some(config.password.clone());
        pool_config.dbname = Some(config.dbname.clone());
        pool_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pool_config
            .builder(NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            pool_size = config.pool_size,
            "Postgres pool created"
        );

        Ok(Self { pool })
    }

    /// Close the pool; outstanding connections are dropped.
    pub fn close(&self) {
        self.pool.close();
    }
}

#[async_trait]
impl TickStore for PgTickStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        client.batch_execute(SCHEMA).await?;
        info!("Store schema ensured");
        Ok(())
    }

    async fn resolve_topic_id(&self, meta: &TopicMeta) -> Result<i64, StoreError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        if let Some(row) = client.query_opt(SELECT_TOPIC, &[&meta.name]).await? {
            return Ok(row.get(0));
        }

        let row = client
            .query_one(
                UPSERT_TOPIC,
                &[
                    &meta.name,
                    &meta.index_name,
                    &meta.contract_type,
                    &meta.strike,
                    &meta.expiry,
                ],
            )
            .await?;
        let topic_id: i64 = row.get(0);
        debug!(topic = %meta.name, topic_id, "Topic registered");
        Ok(topic_id)
    }

    async fn insert_ticks(&self, rows: &[TickRow]) -> Result<u64, StoreError> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let tx = client.transaction().await?;
        let stmt = tx.prepare(INSERT_TICK).await?;
        let mut written = 0u64;
        for row in rows {
            written += tx
                .execute(&stmt, &[&row.topic_id, &row.price, &row.received_at])
                .await?;
        }
        tx.commit().await?;
        Ok(written)
    }
}
