//! Proof result types shared by the prover adapters, the cache, and the
//! job pipeline.

use serde::{Deserialize, Serialize};

/// A generated proof.
///
/// Circuits consumed by an on-chain Groth16 verifier return the structured
/// `{a, b, c}` triple shaped like verifier calldata; other circuits return a
/// single opaque blob. The variant is resolved by circuit identity, not by
/// inspecting the payload at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProofPayload {
    Structured {
        a: [String; 2],
        b: [[String; 2]; 2],
        c: [String; 2],
    },
    Opaque(String),
}

impl ProofPayload {
    pub fn is_structured(&self) -> bool {
        matches!(self, ProofPayload::Structured { .. })
    }
}

/// Which payload shape a circuit produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofShape {
    /// Groth16-shaped calldata for an on-chain verifier
    Structured,
    /// Single opaque proof blob
    Opaque,
}

impl ProofShape {
    /// Resolve the output shape from circuit identity.
    ///
    /// The eligibility and batch-tally circuits feed on-chain verifiers and
    /// produce calldata triples; everything else is an opaque blob.
    pub fn for_circuit(name: &str) -> Self {
        match name {
            "eligibility" | "batch_tally" => ProofShape::Structured,
            _ => ProofShape::Opaque,
        }
    }
}

/// A complete proof result: the payload plus its public signals.
///
/// Contract: same inputs + same circuit identity + same prover
/// implementation produce a byte-identical bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub proof: ProofPayload,
    /// Public signals as decimal strings (field elements exceed u64)
    pub pub_signals: Vec<String>,
}

/// Append-only audit record written once per successfully completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofAuditRecord {
    pub id: i64,
    /// Hash of the circuit the proof was computed under (hex)
    pub circuit_hash: String,
    /// SHA-256 of the canonicalized inputs (hex)
    pub input_hash: String,
    /// Hash of the proof payload (hex)
    pub proof_root: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Fields of an audit record before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewProofAudit {
    pub circuit_hash: String,
    pub input_hash: String,
    pub proof_root: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
