//! Trait definitions for the pipeline's shared stores
//!
//! Every store has an in-memory implementation (DB-less mode, tests) and a
//! PostgreSQL implementation; the pipeline only sees these traits.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{
    CircuitRecord, CurveId, DeadLetterRecord, NewDeadLetter, NewProofAudit, ProofAuditRecord,
};

use super::Result;

/// Per-identity, per-day admission counters.
///
/// Invariant: for quota Q, exactly Q `try_admit` calls succeed for one
/// `(identity, day)` key under arbitrary concurrent interleaving.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// Atomically increment the counter iff the pre-increment value is
    /// strictly below `quota`. Returns whether the increment was applied.
    ///
    /// First use of the day creates the counter row; the loser of a
    /// creation race falls back to the conditional-increment path rather
    /// than erroring.
    async fn try_admit(&self, identity: &str, day: &str, quota: u32) -> Result<bool>;

    /// Units consumed so far for the `(identity, day)` bucket.
    async fn used(&self, identity: &str, day: &str) -> Result<u32>;
}

/// Database-backed circuit version records, overriding the static manifest.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CircuitStore: Send + Sync {
    /// The active record for `(name, curve)`, if any.
    ///
    /// Must be atomic relative to a concurrent `activate`: a reader sees
    /// either the old or the new record, never neither once one version
    /// has been activated.
    async fn active(&self, name: &str, curve: CurveId) -> Result<Option<CircuitRecord>>;

    /// Activate a circuit version, deactivating the prior active record
    /// for the same `(name, curve)` in the same critical section.
    async fn activate(&self, record: CircuitRecord) -> Result<()>;
}

/// Append-only ledger of completed proofs for external verification.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one record. Called exactly once per successful job.
    async fn append(&self, record: NewProofAudit) -> Result<()>;

    /// List records, most recent first.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ProofAuditRecord>>;
}

/// Store of permanently failed submissions and relays.
///
/// Records are never auto-deleted; clearing them is operator work.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persist a failed unit of work. Returns the record id.
    async fn record(&self, entry: NewDeadLetter) -> Result<i64>;

    /// List records, most recent first.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<DeadLetterRecord>>;

    async fn count(&self) -> Result<i64>;
}
