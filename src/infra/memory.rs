//! In-memory store implementations
//!
//! Used when no `DATABASE_URL` is configured and by tests. Semantics match
//! the PostgreSQL implementations: conditional atomic increments for
//! admission, atomic active-version flips, append-only audit and
//! dead-letter logs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    CircuitRecord, CurveId, DeadLetterRecord, NewDeadLetter, NewProofAudit, ProofAuditRecord,
};
use crate::infra::{AdmissionStore, AuditStore, CircuitStore, DeadLetterStore, Result};

// ============================================================================
// Admission
// ============================================================================

/// In-memory admission counters.
///
/// Each `(identity, day)` key owns its own atomic counter, so different
/// keys never contend; the outer map is only write-locked when a key is
/// first created.
#[derive(Default)]
pub struct MemoryAdmissionStore {
    counters: RwLock<HashMap<(String, String), Arc<AtomicU32>>>,
}

impl MemoryAdmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_below(counter: &AtomicU32, quota: u32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                if count < quota {
                    Some(count + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }
}

#[async_trait]
impl AdmissionStore for MemoryAdmissionStore {
    async fn try_admit(&self, identity: &str, day: &str, quota: u32) -> Result<bool> {
        let key = (identity.to_string(), day.to_string());

        if let Some(counter) = self.counters.read().await.get(&key).cloned() {
            return Ok(Self::increment_below(&counter, quota));
        }

        // First request of the day: create the counter, then take the
        // conditional-increment path. A racing creator that loses the
        // insert simply increments the winner's counter.
        let counter = {
            let mut counters = self.counters.write().await;
            counters
                .entry(key)
                .or_insert_with(|| Arc::new(AtomicU32::new(0)))
                .clone()
        };

        Ok(Self::increment_below(&counter, quota))
    }

    async fn used(&self, identity: &str, day: &str) -> Result<u32> {
        let key = (identity.to_string(), day.to_string());
        Ok(self
            .counters
            .read()
            .await
            .get(&key)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0))
    }
}

// ============================================================================
// Circuits
// ============================================================================

/// In-memory circuit version records.
#[derive(Default)]
pub struct MemoryCircuitStore {
    records: RwLock<HashMap<(String, CurveId), Vec<CircuitRecord>>>,
}

impl MemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CircuitStore for MemoryCircuitStore {
    async fn active(&self, name: &str, curve: CurveId) -> Result<Option<CircuitRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(name.to_string(), curve))
            .and_then(|versions| versions.iter().find(|r| r.active).cloned()))
    }

    async fn activate(&self, record: CircuitRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let versions = records
            .entry((record.name.clone(), record.curve))
            .or_default();

        // Deactivate-then-activate under one write lock: readers see the
        // old or the new record, never neither.
        for existing in versions.iter_mut() {
            existing.active = false;
        }
        versions.retain(|r| r.version != record.version);
        versions.push(CircuitRecord {
            active: true,
            ..record
        });

        Ok(())
    }
}

// ============================================================================
// Audit ledger
// ============================================================================

/// In-memory append-only audit ledger.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<ProofAuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: NewProofAudit) -> Result<()> {
        let mut records = self.records.lock().await;
        let id = records.len() as i64 + 1;
        records.push(ProofAuditRecord {
            id,
            circuit_hash: record.circuit_hash,
            input_hash: record.input_hash,
            proof_root: record.proof_root,
            timestamp: record.timestamp,
        });
        Ok(())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ProofAuditRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Dead letters
// ============================================================================

/// In-memory dead-letter store.
#[derive(Default)]
pub struct MemoryDeadLetterStore {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn record(&self, entry: NewDeadLetter) -> Result<i64> {
        let mut records = self.records.lock().await;
        let id = records.len() as i64 + 1;
        records.push(DeadLetterRecord {
            id,
            event_block: entry.event_block,
            tx_hash: entry.tx_hash,
            payload: entry.payload,
            error: entry.error,
            attempts: entry.attempts,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<DeadLetterRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.records.lock().await.len() as i64)
    }
}

// ============================================================================
// Tests
// ============================================================================
