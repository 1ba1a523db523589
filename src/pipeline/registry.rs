//! Circuit identity resolution
//!
//! `(circuit, curve) -> circuit_hash`, preferring an active store-backed
//! override and falling back to the static manifest. Pure lookup, safe to
//! call concurrently with an admin version flip: a resolver sees either
//! the old or the new hash, never an in-between state.

use std::sync::Arc;

use crate::domain::{CircuitManifest, CircuitRecord, CurveId, ManifestEntry};
use crate::infra::{CircuitStore, PipelineError, Result};

pub struct CircuitRegistry {
    store: Arc<dyn CircuitStore>,
    manifest: CircuitManifest,
}

impl CircuitRegistry {
    pub fn new(store: Arc<dyn CircuitStore>, manifest: CircuitManifest) -> Self {
        Self { store, manifest }
    }

    /// Resolve the circuit hash for a `(name, curve)` pair.
    pub async fn resolve(&self, name: &str, curve: CurveId) -> Result<String> {
        if let Some(record) = self.store.active(name, curve).await? {
            return Ok(record.circuit_hash);
        }

        if let Some(entry) = self.manifest.entry(name, curve) {
            return Ok(entry.hash.clone());
        }

        Err(PipelineError::UnknownCircuit {
            name: name.to_string(),
            curve,
        })
    }

    /// Artifact locations from the manifest, if compiled artifacts exist.
    pub fn artifacts(&self, name: &str, curve: CurveId) -> Option<&ManifestEntry> {
        self.manifest.entry(name, curve)
    }

    /// Activate a circuit version, atomically replacing the prior one.
    pub async fn activate(&self, record: CircuitRecord) -> Result<()> {
        self.store.activate(record).await
    }

    pub fn manifest(&self) -> &CircuitManifest {
        &self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MemoryCircuitStore;

    fn manifest_with_eligibility() -> CircuitManifest {
        let mut manifest = CircuitManifest::empty();
        manifest.insert(
            "eligibility",
            CurveId::Bn254,
            ManifestEntry {
                hash: "manifest-hash".into(),
                r1cs: "artifacts/eligibility.r1cs".into(),
                wasm: "artifacts/eligibility.wasm".into(),
                zkey: "artifacts/eligibility.zkey".into(),
            },
        );
        manifest
    }

    #[tokio::test]
    async fn manifest_is_the_fallback() {
        let registry = CircuitRegistry::new(
            Arc::new(MemoryCircuitStore::new()),
            manifest_with_eligibility(),
        );

        let hash = registry.resolve("eligibility", CurveId::Bn254).await.unwrap();
        assert_eq!(hash, "manifest-hash");
    }

    #[tokio::test]
    async fn active_record_overrides_manifest() {
        let registry = CircuitRegistry::new(
            Arc::new(MemoryCircuitStore::new()),
            manifest_with_eligibility(),
        );

        registry
            .activate(CircuitRecord {
                name: "eligibility".into(),
                curve: CurveId::Bn254,
                version: 2,
                circuit_hash: "override-hash".into(),
                active: true,
            })
            .await
            .unwrap();

        let hash = registry.resolve("eligibility", CurveId::Bn254).await.unwrap();
        assert_eq!(hash, "override-hash");
    }

    #[tokio::test]
    async fn unknown_circuit_errors() {
        let registry =
            CircuitRegistry::new(Arc::new(MemoryCircuitStore::new()), CircuitManifest::empty());

        let err = registry.resolve("missing", CurveId::Bn254).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownCircuit { .. }));
    }

    #[tokio::test]
    async fn curve_is_part_of_identity() {
        let registry = CircuitRegistry::new(
            Arc::new(MemoryCircuitStore::new()),
            manifest_with_eligibility(),
        );

        assert!(registry.resolve("eligibility", CurveId::Bn254).await.is_ok());
        assert!(registry
            .resolve("eligibility", CurveId::Bls12_381)
            .await
            .is_err());
    }
}
