//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use zkvote_pipeline::domain::{CircuitManifest, CurveId, JobId, JobSnapshot, ManifestEntry};
use zkvote_pipeline::infra::{
    MemoryAdmissionStore, MemoryAuditStore, MemoryCircuitStore, MemoryDeadLetterStore,
};
use zkvote_pipeline::pipeline::{CircuitRegistry, JobPipeline, PipelineConfig};
use zkvote_pipeline::prover::DeterministicProver;

/// Manifest covering the three standard circuits on bn254.
pub fn test_manifest() -> CircuitManifest {
    let mut manifest = CircuitManifest::empty();
    for name in ["eligibility", "voice", "batch_tally"] {
        manifest.insert(
            name,
            CurveId::Bn254,
            ManifestEntry {
                hash: format!("{name}-hash-v1"),
                r1cs: format!("artifacts/bn254/{name}/{name}.r1cs"),
                wasm: format!("artifacts/bn254/{name}/{name}.wasm"),
                zkey: format!("artifacts/bn254/{name}/{name}.zkey"),
            },
        );
    }
    manifest
}

/// Pipeline fixture: in-memory stores, deterministic prover, fast stream
/// cadence. Audit records land in the returned store.
pub fn test_pipeline(quota: u32) -> (Arc<JobPipeline>, Arc<MemoryAuditStore>) {
    let audits = Arc::new(MemoryAuditStore::new());
    let registry = CircuitRegistry::new(Arc::new(MemoryCircuitStore::new()), test_manifest());

    let pipeline = JobPipeline::new(
        registry,
        Arc::new(DeterministicProver::new()),
        Arc::new(MemoryAdmissionStore::new()),
        audits.clone(),
        PipelineConfig {
            quota,
            workers: 2,
            stream_interval: Duration::from_millis(10),
            ..PipelineConfig::default()
        },
    );

    (pipeline, audits)
}

/// The eligibility inputs used across scenarios.
pub fn eligibility_inputs() -> serde_json::Value {
    json!({"country": "US", "dob": "1970-01-01", "residency": "CA"})
}

/// Distinct valid voice-circuit inputs.
pub fn voice_inputs(n: u64) -> serde_json::Value {
    json!({"election_id": n, "option": 0, "credits": 4})
}

/// Poll a job until it reaches a terminal state.
pub async fn wait_terminal(pipeline: &JobPipeline, job_id: &JobId) -> JobSnapshot {
    for _ in 0..400 {
        let snapshot = pipeline.status(job_id).await.unwrap();
        if snapshot.state.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

/// Dead-letter store fixture shared with orchestrator tests.
pub fn dead_letter_store() -> Arc<MemoryDeadLetterStore> {
    Arc::new(MemoryDeadLetterStore::new())
}
