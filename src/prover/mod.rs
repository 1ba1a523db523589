//! Pluggable proof generation
//!
//! The pipeline treats proving as an external capability: given circuit
//! identity and inputs, a [`Prover`] returns a proof payload and public
//! signals. The production adapter shells out to the snarkjs toolchain;
//! a deterministic stand-in covers environments without compiled
//! artifacts and keeps tests reproducible.

mod deterministic;
mod snarkjs;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{CurveId, ProofBundle};
use crate::infra::Result;

pub use deterministic::DeterministicProver;
pub use snarkjs::SnarkjsProver;

/// Proof generation capability.
///
/// Contract: same inputs + same circuit identity + same implementation
/// produce a byte-identical bundle.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Prover: Send + Sync {
    async fn prove(
        &self,
        circuit: &str,
        curve: CurveId,
        inputs: &serde_json::Value,
    ) -> Result<ProofBundle>;
}
