//! Proof job pipeline
//!
//! Accepts proof requests, enforces admission, memoizes results by content
//! address, and drives asynchronous proof generation on a worker pool.
//!
//! The admission + cache-check path runs synchronously on the caller's
//! task; proof computation is decoupled by an mpsc queue. Two submissions
//! for the same fingerprint racing ahead of the first completion may both
//! compute — the cache write is idempotent, so the result converges.

mod admission;
mod job;
mod registry;
mod validate;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::crypto;
use crate::domain::{CurveId, Hash256, JobId, JobSnapshot, NewProofAudit, ProofBundle};
use crate::infra::{AdmissionStore, AuditStore, PipelineError, ProofCache, Result};
use crate::prover::Prover;

pub use admission::AdmissionController;
pub use job::JobTable;
pub use registry::CircuitRegistry;
pub use validate::InputValidator;

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Proof requests an identity may make per day bucket
    pub quota: u32,
    /// Worker tasks computing proofs
    pub workers: usize,
    /// Queue depth between submission and the workers
    pub queue_depth: usize,
    /// Cadence of progress-stream snapshots
    pub stream_interval: Duration,
    /// Proof cache entry cap
    pub cache_entries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quota: 25,
            workers: 4,
            queue_depth: 256,
            stream_interval: Duration::from_secs(2),
            cache_entries: 100_000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let quota = std::env::var("PROOF_QUOTA")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.quota);

        let workers = std::env::var("PROOF_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.workers);

        let stream_interval = std::env::var("STREAM_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.stream_interval);

        Self {
            quota,
            workers,
            stream_interval,
            ..defaults
        }
    }
}

/// Result of a submission, distinguished by shape at the boundary:
/// a synchronous cache hit is an immediate completed result, the async
/// path hands back a job id to poll.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Cached(ProofBundle),
    Enqueued(JobId),
}

struct WorkItem {
    job_id: JobId,
    circuit: String,
    curve: CurveId,
    circuit_hash: String,
    fingerprint: Hash256,
    inputs: serde_json::Value,
}

/// The proof job pipeline.
pub struct JobPipeline {
    registry: CircuitRegistry,
    admission: AdmissionController,
    validator: InputValidator,
    cache: Arc<ProofCache>,
    jobs: Arc<JobTable>,
    queue: mpsc::Sender<WorkItem>,
    config: PipelineConfig,
}

impl JobPipeline {
    /// Build the pipeline and spawn its worker pool.
    pub fn new(
        registry: CircuitRegistry,
        prover: Arc<dyn Prover>,
        admission_store: Arc<dyn AdmissionStore>,
        audit: Arc<dyn AuditStore>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        let cache = Arc::new(ProofCache::new(config.cache_entries));
        let jobs = Arc::new(JobTable::new());
        let (tx, rx) = mpsc::channel(config.queue_depth);

        let pipeline = Arc::new(Self {
            registry,
            admission: AdmissionController::new(admission_store, config.quota),
            validator: InputValidator::new(),
            cache: cache.clone(),
            jobs: jobs.clone(),
            queue: tx,
            config,
        });

        spawn_workers(
            pipeline.config.workers,
            rx,
            prover,
            cache,
            jobs,
            audit,
        );

        pipeline
    }

    /// Submit a proof request.
    ///
    /// Order matters and is load-bearing: the quota unit is consumed
    /// first, then inputs are validated, then the cache is checked. A
    /// rejected or memoized request still costs one admission unit.
    pub async fn submit(
        &self,
        identity: &str,
        circuit: &str,
        curve: CurveId,
        inputs: serde_json::Value,
    ) -> Result<SubmitOutcome> {
        if !self.admission.try_admit(identity).await? {
            return Err(PipelineError::QuotaExceeded);
        }

        self.validator.validate(circuit, &inputs)?;

        let circuit_hash = self.registry.resolve(circuit, curve).await?;
        let fingerprint = crypto::fingerprint(&inputs, &circuit_hash);

        if let Some(bundle) = self.cache.get(&fingerprint).await {
            return Ok(SubmitOutcome::Cached(bundle));
        }

        let job_id = self.jobs.create().await;
        let item = WorkItem {
            job_id,
            circuit: circuit.to_string(),
            curve,
            circuit_hash,
            fingerprint,
            inputs,
        };

        self.queue
            .send(item)
            .await
            .map_err(|_| PipelineError::Internal("job queue closed".into()))?;

        info!(job_id = %job_id, circuit, %curve, "enqueued proof job");
        Ok(SubmitOutcome::Enqueued(job_id))
    }

    /// Non-blocking poll. Idempotent after a terminal state.
    pub async fn status(&self, job_id: &JobId) -> Result<JobSnapshot> {
        self.jobs
            .snapshot(job_id)
            .await
            .ok_or(PipelineError::JobNotFound(*job_id))
    }

    /// Push-style progress stream.
    ///
    /// Emits a snapshot immediately, then one per interval until terminal,
    /// then one final terminal snapshot, then closes. Each call gets its
    /// own poll-and-emit loop; dropping the receiver never affects the
    /// job.
    pub async fn stream(&self, job_id: &JobId) -> Result<mpsc::Receiver<JobSnapshot>> {
        // Reject ids this pipeline never issued before spawning anything.
        self.status(job_id).await?;

        let (tx, rx) = mpsc::channel(8);
        let jobs = self.jobs.clone();
        let job_id = *job_id;
        let interval = self.config.stream_interval;

        tokio::spawn(async move {
            loop {
                let Some(snapshot) = jobs.snapshot(&job_id).await else {
                    break;
                };
                let terminal = snapshot.state.is_terminal();
                if tx.send(snapshot).await.is_err() {
                    break; // consumer disconnected
                }
                if terminal {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });

        Ok(rx)
    }

    /// Cache lookup without admission.
    ///
    /// A circuit that does not resolve reports "no entry" here rather than
    /// propagating the registry error; only `submit` treats an unresolved
    /// circuit as hard failure.
    pub async fn cached_result(
        &self,
        circuit: &str,
        curve: CurveId,
        inputs: &serde_json::Value,
    ) -> Option<ProofBundle> {
        let circuit_hash = self.registry.resolve(circuit, curve).await.ok()?;
        let fingerprint = crypto::fingerprint(inputs, &circuit_hash);
        self.cache.get(&fingerprint).await
    }

    /// Remaining quota for the identity's current day bucket.
    pub async fn remaining(&self, identity: &str) -> Result<u32> {
        self.admission.remaining(identity).await
    }

    pub fn registry(&self) -> &CircuitRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ProofCache {
        &self.cache
    }
}

fn spawn_workers(
    count: usize,
    rx: mpsc::Receiver<WorkItem>,
    prover: Arc<dyn Prover>,
    cache: Arc<ProofCache>,
    jobs: Arc<JobTable>,
    audit: Arc<dyn AuditStore>,
) {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    for worker in 0..count.max(1) {
        let rx = rx.clone();
        let prover = prover.clone();
        let cache = cache.clone();
        let jobs = jobs.clone();
        let audit = audit.clone();

        tokio::spawn(async move {
            loop {
                let item = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(item) = item else {
                    break; // pipeline dropped
                };

                run_job(worker, item, &prover, &cache, &jobs, &audit).await;
            }
        });
    }
}

async fn run_job(
    worker: usize,
    item: WorkItem,
    prover: &Arc<dyn Prover>,
    cache: &Arc<ProofCache>,
    jobs: &Arc<JobTable>,
    audit: &Arc<dyn AuditStore>,
) {
    jobs.set_running(&item.job_id, 10).await;

    let bundle = match prover.prove(&item.circuit, item.curve, &item.inputs).await {
        Ok(bundle) => bundle,
        Err(e) => {
            warn!(job_id = %item.job_id, worker, error = %e, "proof job failed");
            jobs.fail(&item.job_id, e.to_string()).await;
            return;
        }
    };

    jobs.set_running(&item.job_id, 90).await;

    let proof_value = match serde_json::to_value(&bundle.proof) {
        Ok(value) => value,
        Err(e) => {
            error!(job_id = %item.job_id, error = %e, "proof payload not serializable");
            jobs.fail(&item.job_id, format!("proof serialization: {e}")).await;
            return;
        }
    };

    let record = NewProofAudit {
        circuit_hash: item.circuit_hash.clone(),
        input_hash: hex::encode(crypto::input_hash(&item.inputs)),
        proof_root: hex::encode(crypto::proof_root(&proof_value)),
        timestamp: Utc::now(),
    };

    // A job is only `done` once its audit record is durable; a failed
    // append fails the job and writes nothing to the cache, so a fresh
    // submit recomputes.
    if let Err(e) = audit.append(record).await {
        error!(job_id = %item.job_id, error = %e, "audit append failed");
        jobs.fail(&item.job_id, format!("audit append: {e}")).await;
        return;
    }

    cache.put(item.fingerprint, bundle.clone()).await;
    jobs.complete(&item.job_id, bundle).await;
    info!(job_id = %item.job_id, worker, circuit = %item.circuit, "proof job completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CircuitManifest, JobState, ManifestEntry};
    use crate::infra::{MemoryAdmissionStore, MemoryAuditStore, MemoryCircuitStore};
    use crate::prover::DeterministicProver;
    use serde_json::json;

    fn test_manifest() -> CircuitManifest {
        let mut manifest = CircuitManifest::empty();
        for name in ["eligibility", "voice", "batch_tally"] {
            manifest.insert(
                name,
                CurveId::Bn254,
                ManifestEntry {
                    hash: format!("{name}-hash-v1"),
                    r1cs: format!("artifacts/{name}.r1cs"),
                    wasm: format!("artifacts/{name}.wasm"),
                    zkey: format!("artifacts/{name}.zkey"),
                },
            );
        }
        manifest
    }

    fn test_pipeline(quota: u32) -> Arc<JobPipeline> {
        let registry = CircuitRegistry::new(Arc::new(MemoryCircuitStore::new()), test_manifest());
        JobPipeline::new(
            registry,
            Arc::new(DeterministicProver::new()),
            Arc::new(MemoryAdmissionStore::new()),
            Arc::new(MemoryAuditStore::new()),
            PipelineConfig {
                quota,
                workers: 2,
                stream_interval: Duration::from_millis(10),
                ..PipelineConfig::default()
            },
        )
    }

    async fn wait_done(pipeline: &JobPipeline, job_id: &JobId) -> JobSnapshot {
        for _ in 0..200 {
            let snap = pipeline.status(job_id).await.unwrap();
            if snap.state.is_terminal() {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} did not finish");
    }

    #[tokio::test]
    async fn malformed_input_never_reaches_the_queue() {
        let pipeline = test_pipeline(5);
        let err = pipeline
            .submit("u", "eligibility", CurveId::Bn254, json!({"country": "US"}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
        // Admission is charged before validation, so even a rejected
        // request consumed its unit
        assert_eq!(pipeline.remaining("u").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn unknown_circuit_is_a_submit_error_but_a_cache_miss_on_lookup() {
        let pipeline = test_pipeline(5);
        let inputs = json!({"anything": 1});

        let err = pipeline
            .submit("u", "no_such_circuit", CurveId::Bn254, inputs.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownCircuit { .. }));

        assert!(pipeline
            .cached_result("no_such_circuit", CurveId::Bn254, &inputs)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn quota_exhaustion_rejects_the_next_submit() {
        let pipeline = test_pipeline(2);
        let inputs = |n: u64| json!({"election_id": n, "option": 0, "credits": 4});

        for n in 0..2 {
            pipeline
                .submit("u", "voice", CurveId::Bn254, inputs(n))
                .await
                .unwrap();
        }

        let err = pipeline
            .submit("u", "voice", CurveId::Bn254, inputs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::QuotaExceeded));
    }

    #[tokio::test]
    async fn stream_ends_with_a_terminal_snapshot() {
        let pipeline = test_pipeline(5);
        let outcome = pipeline
            .submit(
                "u",
                "eligibility",
                CurveId::Bn254,
                json!({"country": "US", "dob": "1970-01-01", "residency": "CA"}),
            )
            .await
            .unwrap();

        let SubmitOutcome::Enqueued(job_id) = outcome else {
            panic!("first submit must enqueue");
        };

        let mut rx = pipeline.stream(&job_id).await.unwrap();
        let mut last = None;
        while let Some(snapshot) = rx.recv().await {
            last = Some(snapshot);
        }

        assert_eq!(last.unwrap().state, JobState::Done);
    }

    #[tokio::test]
    async fn audit_failure_fails_the_job_without_poisoning_the_cache() {
        let mut audit = crate::infra::MockAuditStore::new();
        audit
            .expect_append()
            .returning(|_| Err(PipelineError::Internal("audit store down".into())));

        let registry = CircuitRegistry::new(Arc::new(MemoryCircuitStore::new()), test_manifest());
        let pipeline = JobPipeline::new(
            registry,
            Arc::new(DeterministicProver::new()),
            Arc::new(MemoryAdmissionStore::new()),
            Arc::new(audit),
            PipelineConfig {
                quota: 5,
                workers: 1,
                stream_interval: Duration::from_millis(10),
                ..PipelineConfig::default()
            },
        );

        let inputs = json!({"country": "US", "dob": "1970-01-01", "residency": "CA"});
        let SubmitOutcome::Enqueued(job_id) = pipeline
            .submit("u", "eligibility", CurveId::Bn254, inputs.clone())
            .await
            .unwrap()
        else {
            panic!("must enqueue");
        };

        let snapshot = wait_done(&pipeline, &job_id).await;
        assert_eq!(snapshot.state, JobState::Error);
        assert!(snapshot.error.unwrap().contains("audit"));

        // The failed job wrote nothing: a fresh submit recomputes
        assert!(pipeline
            .cached_result("eligibility", CurveId::Bn254, &inputs)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn stream_of_unknown_job_errors() {
        let pipeline = test_pipeline(5);
        let err = pipeline.stream(&uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn circuit_flip_invalidates_cached_hits() {
        let pipeline = test_pipeline(10);
        let inputs = json!({"country": "US", "dob": "1970-01-01", "residency": "CA"});

        let SubmitOutcome::Enqueued(job_id) = pipeline
            .submit("u", "eligibility", CurveId::Bn254, inputs.clone())
            .await
            .unwrap()
        else {
            panic!("first submit must enqueue");
        };
        wait_done(&pipeline, &job_id).await;

        // Warm: second submit is an immediate hit
        let outcome = pipeline
            .submit("u", "eligibility", CurveId::Bn254, inputs.clone())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Cached(_)));

        // Flip the circuit version: identical inputs now miss
        pipeline
            .registry()
            .activate(crate::domain::CircuitRecord {
                name: "eligibility".into(),
                curve: CurveId::Bn254,
                version: 2,
                circuit_hash: "eligibility-hash-v2".into(),
                active: true,
            })
            .await
            .unwrap();

        let outcome = pipeline
            .submit("u", "eligibility", CurveId::Bn254, inputs)
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Enqueued(_)));
    }
}
