//! Chain-state orchestrator
//!
//! A single sequential state machine that discovers an election on chain,
//! waits out its voting window, aggregates votes, proves the tally, and
//! submits the result — with bounded retries and a dead-letter fallback
//! on the submission and relay legs.
//!
//! Phases: `Connecting → WatchingForElection → WaitingForDeadline →
//! GatheringVotes → Proving → Submitting → Done`, with
//! `AwaitingRetry → DeadLettered` branching off `Submitting`.

mod chain;
mod relay;
mod votes;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::crypto::relay_reference;
use crate::domain::{
    CurveId, ElectionBounds, ElectionCreatedEvent, NewDeadLetter, ProofPayload, VoteCastEvent,
};
use crate::infra::{DeadLetterStore, PipelineError, Result, Retry, RetryConfig};
use crate::prover::Prover;

pub use chain::{
    AlloyChainClient, BlockWindow, ChainClient, ChainConfig, SubmissionReceipt, TallyCalldata,
};
pub use relay::{EvmMirrorRelay, RelayConfig, RelaySink};
pub use votes::{aggregate_votes, build_tally_inputs, isqrt, VoteAggregate};

/// Orchestrator state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    WatchingForElection,
    WaitingForDeadline,
    GatheringVotes,
    Proving,
    Submitting,
    AwaitingRetry,
    Done,
    DeadLettered,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Connecting => "connecting",
            Phase::WatchingForElection => "watching_for_election",
            Phase::WaitingForDeadline => "waiting_for_deadline",
            Phase::GatheringVotes => "gathering_votes",
            Phase::Proving => "proving",
            Phase::Submitting => "submitting",
            Phase::AwaitingRetry => "awaiting_retry",
            Phase::Done => "done",
            Phase::DeadLettered => "dead_lettered",
        };
        f.write_str(s)
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Election the orchestrator drives to completion
    pub election_id: u64,
    /// Number of ballot options on the tally
    pub num_options: usize,
    /// Curve for the tally circuit
    pub curve: CurveId,
    /// Cadence of height polls and catch-up sleeps
    pub poll_interval: Duration,
    /// Maximum blocks per log query, respecting provider limits
    pub scan_window: u64,
    /// Only scan up to `head - confirmations`
    pub confirmations: u64,
    /// Block to start scanning from
    pub start_block: u64,
    /// Liveness retry budget at startup; `None` retries forever
    pub connect_attempts: Option<u32>,
    /// Fixed backoff between liveness checks
    pub connect_backoff: Duration,
    /// Total submission attempts before dead-lettering
    pub max_submit_attempts: u32,
    /// Total relay attempts before dead-lettering the relay leg
    pub max_relay_attempts: u32,
    /// Initial backoff between submission/relay attempts
    pub submit_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            election_id: 0,
            num_options: 2,
            curve: CurveId::Bn254,
            poll_interval: Duration::from_secs(5),
            scan_window: 2000,
            confirmations: 5,
            start_block: 0,
            connect_attempts: Some(20),
            connect_backoff: Duration::from_secs(3),
            max_submit_attempts: 5,
            max_relay_attempts: 5,
            submit_backoff: Duration::from_secs(1),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        Self {
            election_id: var("ELECTION_ID").unwrap_or(defaults.election_id),
            num_options: var("NUM_OPTIONS").unwrap_or(defaults.num_options),
            curve: std::env::var("CURVE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.curve),
            poll_interval: var("POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            scan_window: var("SCAN_WINDOW").unwrap_or(defaults.scan_window),
            confirmations: var("CONFIRMATIONS").unwrap_or(defaults.confirmations),
            start_block: var("START_BLOCK").unwrap_or(defaults.start_block),
            connect_attempts: match var::<u32>("CONNECT_ATTEMPTS") {
                Some(0) => None, // 0 = retry forever
                Some(n) => Some(n),
                None => defaults.connect_attempts,
            },
            connect_backoff: var("CONNECT_BACKOFF_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_backoff),
            max_submit_attempts: var("MAX_SUBMIT_ATTEMPTS").unwrap_or(defaults.max_submit_attempts),
            max_relay_attempts: var("MAX_RELAY_ATTEMPTS").unwrap_or(defaults.max_relay_attempts),
            submit_backoff: var("SUBMIT_BACKOFF_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.submit_backoff),
        }
    }
}

/// Terminal outcome of one orchestrator run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Tally submitted on chain; `relayed` reports the secondary leg
    Completed {
        tx_hash: String,
        totals: Vec<u64>,
        relayed: bool,
    },
    /// Submission retries exhausted; the failure is on record
    DeadLettered { record_id: i64 },
}

/// The orchestrator state machine.
pub struct Orchestrator {
    chain: Arc<dyn ChainClient>,
    prover: Arc<dyn Prover>,
    dead_letters: Arc<dyn DeadLetterStore>,
    relay: Option<Arc<dyn RelaySink>>,
    config: OrchestratorConfig,
    phase: Phase,
    /// Low-water mark: first block the next scan window starts at.
    /// Advanced only after a window is fully processed.
    next_scan_block: u64,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        prover: Arc<dyn Prover>,
        dead_letters: Arc<dyn DeadLetterStore>,
        relay: Option<Arc<dyn RelaySink>>,
        config: OrchestratorConfig,
    ) -> Self {
        let next_scan_block = config.start_block;
        Self {
            chain,
            prover,
            dead_letters,
            relay,
            config,
            phase: Phase::Connecting,
            next_scan_block,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "orchestrator phase transition");
        self.phase = phase;
    }

    /// Drive one election cycle to a terminal state.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.transition(Phase::Connecting);
        self.connect().await?;

        self.transition(Phase::WatchingForElection);
        let created = self.watch_for_election().await?;
        let bounds = self.election_bounds().await?;
        info!(
            election_id = created.election_id,
            start_block = bounds.start_block,
            end_block = bounds.end_block,
            "election discovered"
        );

        self.transition(Phase::WaitingForDeadline);
        self.wait_for_deadline(bounds.end_block).await?;

        self.transition(Phase::GatheringVotes);
        let events = self.gather_votes(bounds).await?;
        let aggregate = aggregate_votes(&events, self.config.num_options);
        info!(
            votes = events.len(),
            totals = ?aggregate.credit_sums,
            "votes aggregated"
        );

        self.transition(Phase::Proving);
        let calldata = self.prove_tally(&aggregate).await?;

        self.transition(Phase::Submitting);
        match self.submit_with_retry(&calldata).await {
            Ok(receipt) => {
                let relayed = self.relay_result(&receipt, &aggregate).await;
                self.transition(Phase::Done);
                Ok(RunOutcome::Completed {
                    tx_hash: receipt.tx_hash,
                    totals: aggregate.credit_sums,
                    relayed,
                })
            }
            Err((attempts, last_error)) => {
                let record_id = self
                    .dead_letters
                    .record(NewDeadLetter {
                        event_block: bounds.end_block,
                        tx_hash: None,
                        payload: json!({
                            "election_id": self.config.election_id,
                            "calldata": calldata,
                            "totals": aggregate.credit_sums,
                        }),
                        error: last_error.to_string(),
                        attempts,
                    })
                    .await?;
                self.transition(Phase::DeadLettered);
                error!(
                    record_id,
                    attempts,
                    error = %last_error,
                    "tally submission dead-lettered"
                );
                Ok(RunOutcome::DeadLettered { record_id })
            }
        }
    }

    /// Liveness check with fixed backoff until the endpoint responds or
    /// the configured budget runs out.
    async fn connect(&self) -> Result<()> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.chain.block_number().await {
                Ok(height) => {
                    info!(height, attempts, "chain endpoint reachable");
                    return Ok(());
                }
                Err(e) => {
                    if let Some(budget) = self.config.connect_attempts {
                        if attempts >= budget {
                            return Err(PipelineError::ChainUnavailable(format!(
                                "endpoint unreachable after {attempts} attempts: {e}"
                            )));
                        }
                    }
                    warn!(attempts, error = %e, "waiting for chain endpoint");
                    tokio::time::sleep(self.config.connect_backoff).await;
                }
            }
        }
    }

    /// Poll for the target election's creation event, scanning forward in
    /// bounded windows from the low-water mark.
    async fn watch_for_election(&mut self) -> Result<ElectionCreatedEvent> {
        let retry = Retry::new(RetryConfig::chain());

        loop {
            let head = retry
                .run_classified(
                    "block_number",
                    || self.chain.block_number(),
                    PipelineError::is_transient,
                )
                .await
                .into_result()?;
            let confirmed = head.saturating_sub(self.config.confirmations);

            if confirmed < self.next_scan_block {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            let window = BlockWindow {
                from: self.next_scan_block,
                to: confirmed.min(self.next_scan_block + self.config.scan_window - 1),
            };

            let events = retry
                .run_classified(
                    "election_created scan",
                    || self.chain.election_created(window),
                    PipelineError::is_transient,
                )
                .await
                .into_result()?;

            let found = events
                .into_iter()
                .find(|e| e.election_id == self.config.election_id);

            // Advance the mark only now that the window is processed
            self.next_scan_block = window.to + 1;

            if let Some(event) = found {
                return Ok(event);
            }

            if window.to >= confirmed {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }

    async fn election_bounds(&self) -> Result<ElectionBounds> {
        Retry::new(RetryConfig::chain())
            .run_classified(
                "election_bounds",
                || self.chain.election_bounds(self.config.election_id),
                PipelineError::is_transient,
            )
            .await
            .into_result()
    }

    /// Sleep-poll current height until the end block is reached.
    async fn wait_for_deadline(&self, end_block: u64) -> Result<()> {
        let retry = Retry::new(RetryConfig::chain());

        loop {
            let height = retry
                .run_classified(
                    "deadline poll",
                    || self.chain.block_number(),
                    PipelineError::is_transient,
                )
                .await
                .into_result()?;

            if height >= end_block {
                info!(height, end_block, "voting deadline reached");
                return Ok(());
            }

            tracing::debug!(height, end_block, "waiting for voting deadline");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Scan vote events across the election's block range in bounded
    /// windows.
    async fn gather_votes(&self, bounds: ElectionBounds) -> Result<Vec<VoteCastEvent>> {
        let retry = Retry::new(RetryConfig::chain());
        let mut events = Vec::new();
        let mut from = bounds.start_block;

        while from <= bounds.end_block {
            let window = BlockWindow {
                from,
                to: bounds.end_block.min(from + self.config.scan_window - 1),
            };

            let mut batch = retry
                .run_classified(
                    "votes_cast scan",
                    || self.chain.votes_cast(self.config.election_id, window),
                    PipelineError::is_transient,
                )
                .await
                .into_result()?;
            events.append(&mut batch);

            from = window.to + 1;
        }

        Ok(events)
    }

    /// Prove the tally. Failure here is fatal for the cycle: re-running
    /// with the same inputs and circuit is idempotent, so the operator
    /// restarts rather than the orchestrator retrying blind.
    async fn prove_tally(&self, aggregate: &VoteAggregate) -> Result<TallyCalldata> {
        let inputs = build_tally_inputs(self.config.election_id, aggregate);
        let bundle = self
            .prover
            .prove("batch_tally", self.config.curve, &inputs)
            .await
            .map_err(|e| {
                error!(error = %e, "tally proving failed");
                e
            })?;

        match bundle.proof {
            ProofPayload::Structured { a, b, c } => Ok(TallyCalldata {
                a,
                b,
                c,
                pub_signals: bundle.pub_signals,
            }),
            ProofPayload::Opaque(_) => Err(PipelineError::Internal(
                "tally circuit produced an opaque proof".into(),
            )),
        }
    }

    /// Submit with bounded retries. Returns the last error and the
    /// attempt count on exhaustion so the caller can dead-letter.
    async fn submit_with_retry(
        &mut self,
        calldata: &TallyCalldata,
    ) -> std::result::Result<SubmissionReceipt, (u32, PipelineError)> {
        let max_attempts = self.config.max_submit_attempts.max(1);
        let backoff = RetryConfig::submission().with_initial_delay(self.config.submit_backoff);
        let mut last_error = PipelineError::Internal("no submission attempt made".into());

        for attempt in 1..=max_attempts {
            match self
                .chain
                .submit_tally(self.config.election_id, calldata)
                .await
            {
                Ok(receipt) => {
                    info!(attempt, tx_hash = %receipt.tx_hash, "tally submitted");
                    return Ok(receipt);
                }
                Err(e)
                    if matches!(
                        e,
                        PipelineError::ChainUnavailable(_)
                            | PipelineError::SubmissionFailed { .. }
                    ) =>
                {
                    warn!(attempt, max_attempts, error = %e, "tally submission failed");
                    last_error = e;
                    if attempt < max_attempts {
                        self.transition(Phase::AwaitingRetry);
                        tokio::time::sleep(backoff.delay_for_attempt(attempt - 1)).await;
                        self.transition(Phase::Submitting);
                    }
                }
                // Malformed calldata and the like cannot succeed on retry
                Err(e) => return Err((attempt, e)),
            }
        }

        Err((max_attempts, last_error))
    }

    /// Mirror the finalized result to the secondary chain, if configured.
    ///
    /// Has its own retry-then-dead-letter policy; a failure is recorded
    /// but never rolls back or masks the primary submission's success.
    async fn relay_result(&self, receipt: &SubmissionReceipt, aggregate: &VoteAggregate) -> bool {
        let Some(relay) = &self.relay else {
            return false;
        };

        let reference = hex::encode(relay_reference(&receipt.block_hash));
        let config = RetryConfig::submission()
            .with_max_retries(self.config.max_relay_attempts.saturating_sub(1))
            .with_initial_delay(self.config.submit_backoff);

        let result = Retry::new(config)
            .run(
                "relay tally",
                || relay.relay(&reference, self.config.election_id, &aggregate.credit_sums),
            )
            .await;

        let attempts = result.attempts;
        match result.into_result() {
            Ok(()) => true,
            Err(e) => {
                if let Err(store_err) = self
                    .dead_letters
                    .record(NewDeadLetter {
                        event_block: receipt.block_number,
                        tx_hash: Some(receipt.tx_hash.clone()),
                        payload: json!({
                            "election_id": self.config.election_id,
                            "reference": reference,
                            "totals": aggregate.credit_sums,
                        }),
                        error: e.to_string(),
                        attempts,
                    })
                    .await
                {
                    error!(error = %store_err, "failed to record relay dead letter");
                }
                warn!(attempts, error = %e, "relay dead-lettered; primary submission stands");
                false
            }
        }
    }
}
