//! The orchestrator's view of on-chain election state.
//!
//! Elections are owned by the on-chain manager contract; these types only
//! mirror what the watcher reads back from chain events and calls.

use serde::{Deserialize, Serialize};

/// `ElectionCreated` lifecycle event decoded from a chain log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionCreatedEvent {
    pub election_id: u64,
    /// Metadata reference emitted with the event (hex bytes32)
    pub meta: String,
    pub block_number: u64,
}

/// Voting window read from the manager contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionBounds {
    pub start_block: u64,
    pub end_block: u64,
}

/// `VoteCast` event decoded from a chain log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCastEvent {
    pub election_id: u64,
    /// Index of the chosen option
    pub option: u32,
    /// Voice credits spent on the vote
    pub credits: u64,
    pub block_number: u64,
}

/// Permanently failed unit of work retained for operator inspection.
///
/// Created when a submission or relay exhausts its retry budget; never
/// auto-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: i64,
    /// Block the failed work refers to
    pub event_block: u64,
    /// Transaction hash, when one was observed before the failure
    pub tx_hash: Option<String>,
    /// The payload that could not be delivered
    pub payload: serde_json::Value,
    /// Last observed error
    pub error: String,
    /// Attempts made before giving up
    pub attempts: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Fields of a dead-letter record before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub event_block: u64,
    pub tx_hash: Option<String>,
    pub payload: serde_json::Value,
    pub error: String,
    pub attempts: u32,
}
