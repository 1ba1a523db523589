//! Deterministic stand-in prover
//!
//! Derives a pseudo-proof and pseudo-signals from a hash of the
//! canonicalized inputs. Guarantees reproducibility for testing and for
//! environments without compiled circuit artifacts; never a claim of
//! cryptographic validity.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::crypto::{canonicalize_json, sha256};
use crate::domain::{CurveId, ProofBundle, ProofPayload, ProofShape};
use crate::infra::Result;
use crate::prover::Prover;

/// Prover that hashes inputs into a stable pseudo-proof.
#[derive(Debug, Default, Clone)]
pub struct DeterministicProver;

impl DeterministicProver {
    pub fn new() -> Self {
        Self
    }

    fn limb(digest: &[u8; 32], curve: CurveId, tag: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(curve.as_str().as_bytes());
        hasher.update(tag.as_bytes());
        let out: [u8; 32] = hasher.finalize().into();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&out[..16]);
        u128::from_be_bytes(bytes).to_string()
    }

    fn signal_count(circuit: &str) -> usize {
        // The tally verifier expects seven public signals in its calldata.
        match circuit {
            "batch_tally" => 7,
            _ => 4,
        }
    }
}

#[async_trait]
impl Prover for DeterministicProver {
    async fn prove(
        &self,
        circuit: &str,
        curve: CurveId,
        inputs: &serde_json::Value,
    ) -> Result<ProofBundle> {
        let digest = sha256(canonicalize_json(inputs).as_bytes());
        let h = hex::encode(digest);

        let pub_signals: Vec<String> = (0..Self::signal_count(circuit))
            .map(|i| {
                let chunk = &h[i * 8..i * 8 + 8];
                // 8 hex chars always parse as u32
                u32::from_str_radix(chunk, 16)
                    .expect("hex digest chunk")
                    .to_string()
            })
            .collect();

        let proof = match ProofShape::for_circuit(circuit) {
            ProofShape::Structured => ProofPayload::Structured {
                a: [
                    Self::limb(&digest, curve, "a0"),
                    Self::limb(&digest, curve, "a1"),
                ],
                b: [
                    [
                        Self::limb(&digest, curve, "b00"),
                        Self::limb(&digest, curve, "b01"),
                    ],
                    [
                        Self::limb(&digest, curve, "b10"),
                        Self::limb(&digest, curve, "b11"),
                    ],
                ],
                c: [
                    Self::limb(&digest, curve, "c0"),
                    Self::limb(&digest, curve, "c1"),
                ],
            },
            ProofShape::Opaque => ProofPayload::Opaque(format!("proof-{}", &h[..16])),
        };

        Ok(ProofBundle { proof, pub_signals })
    }
}
