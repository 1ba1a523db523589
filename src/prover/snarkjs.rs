//! snarkjs subprocess prover
//!
//! Shells out to the external witness/proof toolchain using artifacts
//! located via the circuit manifest. Any missing artifact or subprocess
//! failure falls back to the deterministic stand-in instead of failing
//! the job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{CircuitManifest, CurveId, ManifestEntry, ProofBundle, ProofPayload, ProofShape};
use crate::infra::Result;
use crate::prover::{DeterministicProver, Prover};

/// Prover backed by the snarkjs toolchain.
pub struct SnarkjsProver {
    manifest: CircuitManifest,
    work_dir: PathBuf,
    fallback: DeterministicProver,
}

impl SnarkjsProver {
    pub fn new(manifest: CircuitManifest) -> Self {
        Self {
            manifest,
            work_dir: std::env::temp_dir().join("zkvote-prover"),
            fallback: DeterministicProver::new(),
        }
    }

    pub fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = dir;
        self
    }

    async fn run_toolchain(
        &self,
        circuit: &str,
        entry: &ManifestEntry,
        inputs: &serde_json::Value,
    ) -> std::result::Result<ProofBundle, String> {
        let scratch = self.work_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| format!("create scratch dir: {e}"))?;

        let result = self.run_in(&scratch, circuit, entry, inputs).await;

        // Best-effort cleanup; scratch contents are worthless after parsing.
        let _ = tokio::fs::remove_dir_all(&scratch).await;

        result
    }

    async fn run_in(
        &self,
        scratch: &Path,
        circuit: &str,
        entry: &ManifestEntry,
        inputs: &serde_json::Value,
    ) -> std::result::Result<ProofBundle, String> {
        let input_path = scratch.join("input.json");
        let witness_path = scratch.join("witness.wtns");
        let proof_path = scratch.join("proof.json");
        let public_path = scratch.join("public.json");

        tokio::fs::write(&input_path, serde_json::to_vec(inputs).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| format!("write inputs: {e}"))?;

        run_snarkjs(&[
            "wtns",
            "calculate",
            &entry.wasm,
            &path_str(&input_path),
            &path_str(&witness_path),
        ])
        .await?;

        run_snarkjs(&[
            "groth16",
            "prove",
            &entry.zkey,
            &path_str(&witness_path),
            &path_str(&proof_path),
            &path_str(&public_path),
        ])
        .await?;

        let proof_raw = tokio::fs::read_to_string(&proof_path)
            .await
            .map_err(|e| format!("read proof output: {e}"))?;
        let public_raw = tokio::fs::read_to_string(&public_path)
            .await
            .map_err(|e| format!("read public output: {e}"))?;

        let proof_json: serde_json::Value =
            serde_json::from_str(&proof_raw).map_err(|e| format!("parse proof output: {e}"))?;
        let pub_signals: Vec<String> =
            serde_json::from_str(&public_raw).map_err(|e| format!("parse public output: {e}"))?;

        let proof = match ProofShape::for_circuit(circuit) {
            ProofShape::Structured => parse_groth16(&proof_json)?,
            // Opaque circuits ship the whole proof object as one blob
            ProofShape::Opaque => {
                ProofPayload::Opaque(crate::crypto::canonicalize_json(&proof_json))
            }
        };

        Ok(ProofBundle { proof, pub_signals })
    }

    fn artifacts_present(entry: &ManifestEntry) -> bool {
        Path::new(&entry.wasm).exists() && Path::new(&entry.zkey).exists()
    }
}

#[async_trait]
impl Prover for SnarkjsProver {
    async fn prove(
        &self,
        circuit: &str,
        curve: CurveId,
        inputs: &serde_json::Value,
    ) -> Result<ProofBundle> {
        let entry = match self.manifest.entry(circuit, curve) {
            Some(entry) if Self::artifacts_present(entry) => entry,
            Some(_) => {
                warn!(circuit, %curve, "circuit artifacts missing on disk, using deterministic fallback");
                return self.fallback.prove(circuit, curve, inputs).await;
            }
            None => {
                warn!(circuit, %curve, "no manifest artifacts for circuit, using deterministic fallback");
                return self.fallback.prove(circuit, curve, inputs).await;
            }
        };

        match self.run_toolchain(circuit, entry, inputs).await {
            Ok(bundle) => Ok(bundle),
            Err(e) => {
                warn!(circuit, %curve, error = %e, "snarkjs toolchain failed, using deterministic fallback");
                self.fallback.prove(circuit, curve, inputs).await
            }
        }
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn run_snarkjs(args: &[&str]) -> std::result::Result<(), String> {
    let output = Command::new("snarkjs")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("spawn snarkjs {}: {e}", args[0]))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "snarkjs {} {} exited with {}: {}",
            args[0],
            args[1],
            output.status,
            stderr.trim()
        ));
    }

    Ok(())
}

/// Parse snarkjs `proof.json` into the calldata triple.
///
/// snarkjs emits projective coordinates; the verifier consumes the first
/// two limbs of each point.
fn parse_groth16(proof: &serde_json::Value) -> std::result::Result<ProofPayload, String> {
    let limb = |v: &serde_json::Value, path: &str| -> std::result::Result<String, String> {
        v.as_str()
            .map(str::to_owned)
            .ok_or_else(|| format!("missing proof field {path}"))
    };

    let a = [
        limb(&proof["pi_a"][0], "pi_a[0]")?,
        limb(&proof["pi_a"][1], "pi_a[1]")?,
    ];
    let b = [
        [
            limb(&proof["pi_b"][0][0], "pi_b[0][0]")?,
            limb(&proof["pi_b"][0][1], "pi_b[0][1]")?,
        ],
        [
            limb(&proof["pi_b"][1][0], "pi_b[1][0]")?,
            limb(&proof["pi_b"][1][1], "pi_b[1][1]")?,
        ],
    ];
    let c = [
        limb(&proof["pi_c"][0], "pi_c[0]")?,
        limb(&proof["pi_c"][1], "pi_c[1]")?,
    ];

    Ok(ProofPayload::Structured { a, b, c })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_snarkjs_proof_output() {
        let raw = json!({
            "pi_a": ["11", "12", "1"],
            "pi_b": [["21", "22"], ["23", "24"], ["1", "0"]],
            "pi_c": ["31", "32", "1"],
            "protocol": "groth16",
            "curve": "bn128"
        });

        let parsed = parse_groth16(&raw).unwrap();
        match parsed {
            ProofPayload::Structured { a, b, c } => {
                assert_eq!(a, ["11".to_string(), "12".to_string()]);
                assert_eq!(b[0], ["21".to_string(), "22".to_string()]);
                assert_eq!(c[1], "32");
            }
            other => panic!("expected structured proof, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_proof_output() {
        assert!(parse_groth16(&json!({"pi_a": ["1"]})).is_err());
    }

    #[tokio::test]
    async fn missing_artifacts_fall_back_deterministically() {
        let mut manifest = CircuitManifest::empty();
        manifest.insert(
            "eligibility",
            CurveId::Bn254,
            ManifestEntry {
                hash: "abcd".into(),
                r1cs: "/nonexistent/eligibility.r1cs".into(),
                wasm: "/nonexistent/eligibility.wasm".into(),
                zkey: "/nonexistent/eligibility.zkey".into(),
            },
        );

        let prover = SnarkjsProver::new(manifest);
        let inputs = json!({"country": "US"});

        let a = prover.prove("eligibility", CurveId::Bn254, &inputs).await.unwrap();
        let b = DeterministicProver::new()
            .prove("eligibility", CurveId::Bn254, &inputs)
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}
