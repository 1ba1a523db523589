//! PostgreSQL dead-letter store
//!
//! Submissions and relays that exhaust their retry budget land here with
//! full context for manual replay. Nothing deletes these rows
//! automatically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::domain::{DeadLetterRecord, NewDeadLetter};
use crate::infra::{DeadLetterStore, Result};

/// PostgreSQL-backed dead-letter store.
pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dead_letter_queue (
                id BIGSERIAL PRIMARY KEY,
                event_block BIGINT NOT NULL,
                tx_hash TEXT,
                payload JSONB NOT NULL,
                error TEXT NOT NULL,
                attempts INT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_dead_letter_queue_created_at
            ON dead_letter_queue (created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn record(&self, entry: NewDeadLetter) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO dead_letter_queue (event_block, tx_hash, payload, error, attempts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(entry.event_block as i64)
        .bind(&entry.tx_hash)
        .bind(&entry.payload)
        .bind(&entry.error)
        .bind(entry.attempts as i32)
        .fetch_one(&self.pool)
        .await?;

        tracing::warn!(
            id,
            event_block = entry.event_block,
            attempts = entry.attempts,
            error = %entry.error,
            "recorded dead letter"
        );

        Ok(id)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<DeadLetterRecord>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, event_block, tx_hash, payload, error, attempts, created_at
            FROM dead_letter_queue
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeadLetterRecord::from).collect())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dead_letter_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: i64,
    event_block: i64,
    tx_hash: Option<String>,
    payload: serde_json::Value,
    error: String,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl From<DeadLetterRow> for DeadLetterRecord {
    fn from(row: DeadLetterRow) -> Self {
        Self {
            id: row.id,
            event_block: row.event_block.max(0) as u64,
            tx_hash: row.tx_hash,
            payload: row.payload,
            error: row.error,
            attempts: row.attempts.max(0) as u32,
            created_at: row.created_at,
        }
    }
}
