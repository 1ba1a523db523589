//! PostgreSQL admission counters
//!
//! Quota enforcement rides on a single conditional upsert: the increment
//! only applies while the stored count is below the quota, so two racing
//! requests at `count = quota - 1` resolve to exactly one success.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::infra::{AdmissionStore, Result};

/// PostgreSQL-backed admission store.
pub struct PgAdmissionStore {
    pool: PgPool,
}

impl PgAdmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the counter table.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proof_requests (
                id BIGSERIAL PRIMARY KEY,
                identity TEXT NOT NULL,
                day TEXT NOT NULL,
                count INT NOT NULL DEFAULT 0,

                CONSTRAINT uq_proof_requests_identity_day UNIQUE (identity, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AdmissionStore for PgAdmissionStore {
    async fn try_admit(&self, identity: &str, day: &str, quota: u32) -> Result<bool> {
        // ON CONFLICT covers the first-request creation race: the loser of
        // the unique-constraint race lands in the conditional update. The
        // WHERE guard makes the increment a no-op at quota, which shows up
        // as zero rows affected.
        let result = sqlx::query(
            r#"
            INSERT INTO proof_requests (identity, day, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (identity, day) DO UPDATE
            SET count = proof_requests.count + 1
            WHERE proof_requests.count < $3
            "#,
        )
        .bind(identity)
        .bind(day)
        .bind(quota as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn used(&self, identity: &str, day: &str) -> Result<u32> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT count FROM proof_requests WHERE identity = $1 AND day = $2",
        )
        .bind(identity)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(count,)| count.max(0) as u32).unwrap_or(0))
    }
}
