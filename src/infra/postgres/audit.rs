//! PostgreSQL proof audit ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::domain::{NewProofAudit, ProofAuditRecord};
use crate::infra::{AuditStore, Result};

/// PostgreSQL-backed append-only audit ledger.
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proof_audit (
                id BIGSERIAL PRIMARY KEY,
                circuit_hash TEXT NOT NULL,
                input_hash TEXT NOT NULL,
                proof_root TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_proof_audit_proof_root
            ON proof_audit (proof_root)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, record: NewProofAudit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO proof_audit (circuit_hash, input_hash, proof_root, timestamp)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.circuit_hash)
        .bind(&record.input_hash)
        .bind(&record.proof_root)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ProofAuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, circuit_hash, input_hash, proof_root, timestamp
            FROM proof_audit
            ORDER BY id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProofAuditRecord::from).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    circuit_hash: String,
    input_hash: String,
    proof_root: String,
    timestamp: DateTime<Utc>,
}

impl From<AuditRow> for ProofAuditRecord {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            circuit_hash: row.circuit_hash,
            input_hash: row.input_hash,
            proof_root: row.proof_root,
            timestamp: row.timestamp,
        }
    }
}
