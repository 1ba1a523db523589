//! zkvote-pipeline
//!
//! Proof job pipeline and chain-state orchestrator for verifiable
//! on-chain elections: admission-controlled, content-addressed proof
//! generation with an audit ledger, and an orchestrator that watches an
//! election to its deadline, proves the tally, submits it on chain, and
//! optionally relays the result to a second chain.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (circuits, jobs, proofs, elections)
//! - [`crypto`] - Canonical JSON hashing and content addressing
//! - [`infra`] - Store traits and implementations, retry, proof cache
//! - [`pipeline`] - The proof job pipeline (admission, cache, workers)
//! - [`prover`] - Pluggable proof generation (snarkjs, deterministic)
//! - [`orchestrator`] - Election-close -> tally-proof -> submission
//! - [`api`] - REST/WebSocket surface of the pipeline
//! - [`server`] - Configuration and bootstrap

pub mod api;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod orchestrator;
pub mod pipeline;
pub mod prover;
pub mod server;

// Re-export commonly used types
pub use domain::{
    CircuitManifest, CircuitRecord, CurveId, Hash256, JobId, JobSnapshot, JobState, ProofBundle,
    ProofPayload,
};

pub use infra::{PipelineError, ProofCache, Result};

pub use pipeline::{JobPipeline, PipelineConfig, SubmitOutcome};
