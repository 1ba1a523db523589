//! PostgreSQL circuit version records

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::str::FromStr;

use crate::domain::{CircuitRecord, CurveId};
use crate::infra::{CircuitStore, PipelineError, Result};

/// PostgreSQL-backed circuit store.
pub struct PgCircuitStore {
    pool: PgPool,
}

impl PgCircuitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS circuits (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                curve TEXT NOT NULL,
                version INT NOT NULL,
                circuit_hash TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT FALSE,

                CONSTRAINT uq_circuits_name_curve_version UNIQUE (name, curve, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_circuits_active
            ON circuits (name, curve) WHERE active
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CircuitStore for PgCircuitStore {
    async fn active(&self, name: &str, curve: CurveId) -> Result<Option<CircuitRecord>> {
        let row = sqlx::query_as::<_, CircuitRow>(
            r#"
            SELECT name, curve, version, circuit_hash, active
            FROM circuits
            WHERE name = $1 AND curve = $2 AND active
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(curve.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CircuitRecord::try_from).transpose()
    }

    async fn activate(&self, record: CircuitRecord) -> Result<()> {
        // Deactivate and activate in one transaction so concurrent
        // resolvers never observe the window between the two writes.
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE circuits SET active = FALSE WHERE name = $1 AND curve = $2 AND active")
            .bind(&record.name)
            .bind(record.curve.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO circuits (name, curve, version, circuit_hash, active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (name, curve, version) DO UPDATE
            SET circuit_hash = EXCLUDED.circuit_hash, active = TRUE
            "#,
        )
        .bind(&record.name)
        .bind(record.curve.as_str())
        .bind(record.version as i32)
        .bind(&record.circuit_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            name = %record.name,
            curve = %record.curve,
            version = record.version,
            circuit_hash = %record.circuit_hash,
            "activated circuit version"
        );

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CircuitRow {
    name: String,
    curve: String,
    version: i32,
    circuit_hash: String,
    active: bool,
}

impl TryFrom<CircuitRow> for CircuitRecord {
    type Error = PipelineError;

    fn try_from(row: CircuitRow) -> Result<Self> {
        let curve = CurveId::from_str(&row.curve)
            .map_err(|e| PipelineError::Internal(format!("invalid curve in circuits table: {e}")))?;

        Ok(CircuitRecord {
            name: row.name,
            curve,
            version: row.version.max(0) as u32,
            circuit_hash: row.circuit_hash,
            active: row.active,
        })
    }
}
