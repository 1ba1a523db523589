//! Integration tests for the chain-state orchestrator
//!
//! A scripted fake chain drives the state machine through whole election
//! cycles: deadline waits, vote gathering, submission retries, the
//! dead-letter fallback, and the decoupled relay leg.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use zkvote_pipeline::crypto::relay_reference;
use zkvote_pipeline::domain::{CurveId, ElectionBounds, ElectionCreatedEvent, VoteCastEvent};
use zkvote_pipeline::infra::{DeadLetterStore, PipelineError, Result};
use zkvote_pipeline::orchestrator::{
    BlockWindow, ChainClient, Orchestrator, OrchestratorConfig, RelaySink, RunOutcome,
    SubmissionReceipt, TallyCalldata,
};
use zkvote_pipeline::prover::DeterministicProver;

use common::dead_letter_store;

// ============================================================================
// Scripted fake chain
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum SubmitScript {
    /// Succeed on the first attempt
    Succeed,
    /// Fail transiently this many times, then succeed
    FlakyTimes(u32),
    /// Revert on every attempt
    AlwaysRevert,
}

struct FakeChainState {
    height: u64,
    election_block: u64,
    bounds: ElectionBounds,
    votes: Vec<VoteCastEvent>,
    submit_script: SubmitScript,
    transient_failures_left: u32,
    submit_calls: u32,
    gather_heights: Vec<u64>,
    last_calldata: Option<TallyCalldata>,
}

struct FakeChain {
    state: Mutex<FakeChainState>,
}

impl FakeChain {
    fn new(
        start_height: u64,
        election_block: u64,
        bounds: ElectionBounds,
        votes: Vec<VoteCastEvent>,
        submit_script: SubmitScript,
    ) -> Arc<Self> {
        let transient_failures_left = match submit_script {
            SubmitScript::FlakyTimes(n) => n,
            _ => 0,
        };
        Arc::new(Self {
            state: Mutex::new(FakeChainState {
                height: start_height,
                election_block,
                bounds,
                votes,
                submit_script,
                transient_failures_left,
                submit_calls: 0,
                gather_heights: Vec::new(),
                last_calldata: None,
            }),
        })
    }

    async fn gather_heights(&self) -> Vec<u64> {
        self.state.lock().await.gather_heights.clone()
    }

    async fn submit_calls(&self) -> u32 {
        self.state.lock().await.submit_calls
    }

    async fn last_calldata(&self) -> Option<TallyCalldata> {
        self.state.lock().await.last_calldata.clone()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn block_number(&self) -> Result<u64> {
        // The chain advances one block per observation
        let mut state = self.state.lock().await;
        let height = state.height;
        state.height += 1;
        Ok(height)
    }

    async fn election_created(&self, window: BlockWindow) -> Result<Vec<ElectionCreatedEvent>> {
        let state = self.state.lock().await;
        if (window.from..=window.to).contains(&state.election_block) {
            Ok(vec![ElectionCreatedEvent {
                election_id: 0,
                meta: "00".repeat(32),
                block_number: state.election_block,
            }])
        } else {
            Ok(vec![])
        }
    }

    async fn election_bounds(&self, _election_id: u64) -> Result<ElectionBounds> {
        Ok(self.state.lock().await.bounds)
    }

    async fn votes_cast(
        &self,
        election_id: u64,
        window: BlockWindow,
    ) -> Result<Vec<VoteCastEvent>> {
        let mut state = self.state.lock().await;
        let height = state.height;
        state.gather_heights.push(height);
        Ok(state
            .votes
            .iter()
            .filter(|v| {
                v.election_id == election_id
                    && (window.from..=window.to).contains(&v.block_number)
            })
            .cloned()
            .collect())
    }

    async fn submit_tally(
        &self,
        _election_id: u64,
        calldata: &TallyCalldata,
    ) -> Result<SubmissionReceipt> {
        let mut state = self.state.lock().await;
        state.submit_calls += 1;
        state.last_calldata = Some(calldata.clone());

        match state.submit_script {
            SubmitScript::AlwaysRevert => Err(PipelineError::SubmissionFailed {
                attempts: 1,
                last_error: "execution reverted".into(),
            }),
            SubmitScript::FlakyTimes(_) if state.transient_failures_left > 0 => {
                state.transient_failures_left -= 1;
                Err(PipelineError::ChainUnavailable("rpc connection reset".into()))
            }
            _ => Ok(SubmissionReceipt {
                tx_hash: "aa".repeat(32),
                block_number: state.height,
                block_hash: "bb".repeat(32),
            }),
        }
    }
}

// ============================================================================
// Fake relay sink
// ============================================================================

struct FakeRelay {
    fail: bool,
    calls: Mutex<Vec<(String, u64, Vec<u64>)>>,
}

impl FakeRelay {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RelaySink for FakeRelay {
    async fn relay(&self, reference: &str, election_id: u64, totals: &[u64]) -> Result<()> {
        self.calls
            .lock()
            .await
            .push((reference.to_string(), election_id, totals.to_vec()));
        if self.fail {
            Err(PipelineError::RelayFailure("mirror program rejected".into()))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        election_id: 0,
        num_options: 2,
        curve: CurveId::Bn254,
        poll_interval: Duration::from_millis(1),
        scan_window: 1000,
        confirmations: 2,
        start_block: 0,
        connect_attempts: Some(3),
        connect_backoff: Duration::from_millis(1),
        max_submit_attempts: 3,
        max_relay_attempts: 2,
        submit_backoff: Duration::from_millis(1),
    }
}

fn vote(option: u32, credits: u64, block: u64) -> VoteCastEvent {
    VoteCastEvent {
        election_id: 0,
        option,
        credits,
        block_number: block,
    }
}

fn standard_votes() -> Vec<VoteCastEvent> {
    vec![
        vote(0, 16, 10),
        vote(0, 9, 12),
        vote(1, 25, 15),
        vote(1, 4, 20),
    ]
}

fn bounds() -> ElectionBounds {
    ElectionBounds {
        start_block: 5,
        end_block: 40,
    }
}

fn orchestrator(
    chain: Arc<FakeChain>,
    dead_letters: Arc<dyn DeadLetterStore>,
    relay: Option<Arc<dyn RelaySink>>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(
        chain,
        Arc::new(DeterministicProver::new()),
        dead_letters,
        relay,
        config,
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_submits_the_tally() {
    let chain = FakeChain::new(10, 3, bounds(), standard_votes(), SubmitScript::Succeed);
    let dlq = dead_letter_store();

    let mut orch = orchestrator(chain.clone(), dlq.clone(), None, fast_config());
    let outcome = orch.run().await.unwrap();

    let RunOutcome::Completed {
        tx_hash,
        totals,
        relayed,
    } = outcome
    else {
        panic!("expected completion");
    };

    assert_eq!(tx_hash, "aa".repeat(32));
    assert_eq!(totals, vec![25, 29]); // per-option credit sums
    assert!(!relayed);
    assert_eq!(dlq.count().await.unwrap(), 0);

    // The tally circuit produced verifier-shaped calldata
    let calldata = chain.last_calldata().await.unwrap();
    assert_eq!(calldata.pub_signals.len(), 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_gates_vote_gathering() {
    let end_block = bounds().end_block;
    let chain = FakeChain::new(10, 3, bounds(), standard_votes(), SubmitScript::Succeed);

    let mut orch = orchestrator(chain.clone(), dead_letter_store(), None, fast_config());
    orch.run().await.unwrap();

    // Votes were only gathered after the deadline was first observed
    let heights = chain.gather_heights().await;
    assert!(!heights.is_empty());
    assert!(
        heights.iter().all(|&h| h >= end_block),
        "gathered at {heights:?}, before end block {end_block}"
    );

    // One window covered the whole range: exactly one transition to
    // gathering
    assert_eq!(heights.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_submission_failures_are_retried() {
    let chain = FakeChain::new(
        10,
        3,
        bounds(),
        standard_votes(),
        SubmitScript::FlakyTimes(2),
    );
    let dlq = dead_letter_store();

    let mut orch = orchestrator(chain.clone(), dlq.clone(), None, fast_config());
    let outcome = orch.run().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(chain.submit_calls().await, 3); // two failures, one success
    assert_eq!(dlq.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_submission_retries_dead_letter_once() {
    let chain = FakeChain::new(10, 3, bounds(), standard_votes(), SubmitScript::AlwaysRevert);
    let dlq = dead_letter_store();

    let mut orch = orchestrator(chain.clone(), dlq.clone(), None, fast_config());

    // The run ends in a recorded failure, not a crash
    let outcome = orch.run().await.unwrap();
    let RunOutcome::DeadLettered { record_id } = outcome else {
        panic!("expected dead letter");
    };

    assert_eq!(chain.submit_calls().await, 3); // the full budget

    // Exactly one record, carrying the payload and the last error
    assert_eq!(dlq.count().await.unwrap(), 1);
    let records = dlq.list(0, 10).await.unwrap();
    assert_eq!(records[0].id, record_id);
    assert_eq!(records[0].event_block, bounds().end_block);
    assert_eq!(records[0].attempts, 3);
    assert!(records[0].error.contains("execution reverted"));
    assert!(records[0].payload["calldata"]["pub_signals"].is_array());
    assert_eq!(records[0].payload["totals"][0], 25);
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_success_reports_relayed() {
    let chain = FakeChain::new(10, 3, bounds(), standard_votes(), SubmitScript::Succeed);
    let relay = FakeRelay::new(false);

    let mut orch = orchestrator(
        chain,
        dead_letter_store(),
        Some(relay.clone() as Arc<dyn RelaySink>),
        fast_config(),
    );
    let outcome = orch.run().await.unwrap();

    let RunOutcome::Completed { relayed, .. } = outcome else {
        panic!("expected completion");
    };
    assert!(relayed);

    // The relay reference is derived from the finalized block hash
    let calls = relay.calls.lock().await;
    assert_eq!(calls.len(), 1);
    let expected = hex::encode(relay_reference(&"bb".repeat(32)));
    assert_eq!(calls[0].0, expected);
    assert_eq!(calls[0].2, vec![25, 29]);
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_failure_never_loses_the_primary_result() {
    let chain = FakeChain::new(10, 3, bounds(), standard_votes(), SubmitScript::Succeed);
    let dlq = dead_letter_store();
    let relay = FakeRelay::new(true);

    let mut orch = orchestrator(
        chain,
        dlq.clone(),
        Some(relay.clone() as Arc<dyn RelaySink>),
        fast_config(),
    );
    let outcome = orch.run().await.unwrap();

    // Primary success stands even though the relay leg died
    let RunOutcome::Completed {
        tx_hash, relayed, ..
    } = outcome
    else {
        panic!("expected completion");
    };
    assert_eq!(tx_hash, "aa".repeat(32));
    assert!(!relayed);

    // The relay exhausted its own budget and left its own record
    assert_eq!(relay.calls.lock().await.len(), 2);
    let records = dlq.list(0, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_hash.as_deref(), Some("aa".repeat(32).as_str()));
    assert!(records[0].error.contains("mirror program rejected"));
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_budget_is_fatal_when_exhausted() {
    struct DeadChain;

    #[async_trait]
    impl ChainClient for DeadChain {
        async fn block_number(&self) -> Result<u64> {
            Err(PipelineError::ChainUnavailable("connection refused".into()))
        }
        async fn election_created(&self, _: BlockWindow) -> Result<Vec<ElectionCreatedEvent>> {
            unreachable!("never connected")
        }
        async fn election_bounds(&self, _: u64) -> Result<ElectionBounds> {
            unreachable!("never connected")
        }
        async fn votes_cast(&self, _: u64, _: BlockWindow) -> Result<Vec<VoteCastEvent>> {
            unreachable!("never connected")
        }
        async fn submit_tally(&self, _: u64, _: &TallyCalldata) -> Result<SubmissionReceipt> {
            unreachable!("never connected")
        }
    }

    let mut orch = Orchestrator::new(
        Arc::new(DeadChain),
        Arc::new(DeterministicProver::new()),
        dead_letter_store(),
        None,
        fast_config(),
    );

    let err = orch.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::ChainUnavailable(_)));
}
