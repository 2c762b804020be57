//! Postgres persistence for canonical agent records.
//!
//! The upsert writer is the only pipeline stage with durable side effects.
//! Each batch runs in a single transaction keyed by the `name` natural key,
//! so re-running the same batch never creates duplicate rows.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::info;

use aidex_core::AgentRecord;

pub const CRATE_NAME: &str = "aidex-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to database")]
    Connect(#[source] sqlx::Error),
    #[error("fetching persisted agents")]
    Fetch(#[source] sqlx::Error),
    #[error("batch upsert failed and was rolled back")]
    UpsertFailed(#[source] sqlx::Error),
    #[error("running migrations")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// A failed upsert rolls back cleanly, so the caller may retry the
    /// identical batch. Retry cadence is the caller's decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::UpsertFailed(_) | StoreError::Connect(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOutcome {
    pub rows_written: u64,
}

/// Storage seam for the pipeline. The Postgres implementation below is the
/// production store; tests supply in-memory implementations.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<AgentRecord>, StoreError>;
    async fn upsert_batch(&self, records: &[AgentRecord]) -> Result<UpsertOutcome, StoreError>;
}

// `created_at` is deliberately absent from the DO UPDATE list: it is set
// once at first insert and immutable afterwards.
const UPSERT_SQL: &str = r#"
INSERT INTO agents (name, description, homepage_url, category, source, trending, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, CURRENT_DATE), COALESCE($8, CURRENT_DATE))
ON CONFLICT (name) DO UPDATE SET
    description = EXCLUDED.description,
    homepage_url = EXCLUDED.homepage_url,
    category = EXCLUDED.category,
    source = EXCLUDED.source,
    trending = EXCLUDED.trending,
    updated_at = CURRENT_DATE
"#;

const FETCH_SQL: &str = r#"
SELECT name, description, homepage_url, category, source, trending, created_at, updated_at
  FROM agents
 ORDER BY name
"#;

pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StoreError::Connect)?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn fetch_all(&self) -> Result<Vec<AgentRecord>, StoreError> {
        let rows = sqlx::query(FETCH_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Fetch)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(AgentRecord {
                name: row.try_get("name").map_err(StoreError::Fetch)?,
                description: row
                    .try_get::<Option<String>, _>("description")
                    .map_err(StoreError::Fetch)?
                    .unwrap_or_default(),
                homepage_url: row.try_get("homepage_url").map_err(StoreError::Fetch)?,
                category: row.try_get("category").map_err(StoreError::Fetch)?,
                source: row.try_get("source").map_err(StoreError::Fetch)?,
                trending: row.try_get("trending").map_err(StoreError::Fetch)?,
                created_at: row.try_get("created_at").map_err(StoreError::Fetch)?,
                updated_at: row.try_get("updated_at").map_err(StoreError::Fetch)?,
            });
        }
        Ok(out)
    }

    async fn upsert_batch(&self, records: &[AgentRecord]) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::UpsertFailed)?;
        let mut rows_written = 0u64;

        // Any row failure drops the transaction, rolling back the batch.
        for record in records {
            let result = sqlx::query(UPSERT_SQL)
                .bind(&record.name)
                .bind(&record.description)
                .bind(&record.homepage_url)
                .bind(&record.category)
                .bind(&record.source)
                .bind(record.trending)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::UpsertFailed)?;
            rows_written += result.rows_affected();
        }

        tx.commit().await.map_err(StoreError::UpsertFailed)?;
        info!(rows_written, "agent batch committed");
        Ok(UpsertOutcome { rows_written })
    }
}
