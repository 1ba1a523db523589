//! Chain access for the orchestrator
//!
//! The state machine only sees the [`ChainClient`] trait: current height,
//! windowed event queries, and submit-and-wait-for-receipt. The alloy
//! implementation talks to the ElectionManager contract; every call has
//! an explicit timeout and maps transport failures to
//! `ChainUnavailable` so the retry layer can classify them.

use std::future::Future;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::domain::{ElectionBounds, ElectionCreatedEvent, VoteCastEvent};
use crate::infra::{PipelineError, Result};

// Contract bindings for the election manager
sol! {
    #[sol(rpc)]
    interface IElectionManager {
        event ElectionCreated(uint256 id, bytes32 meta);

        event VoteCast(uint256 indexed id, uint256 option, uint256 credits);

        function elections(uint256 id) external view returns (uint64 startBlock, uint64 endBlock);

        function tallyVotes(
            uint256[2] a,
            uint256[2][2] b,
            uint256[2] c,
            uint256[7] pubSignals
        ) external;
    }
}

/// Inclusive block range for one scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

/// Groth16 calldata for `tallyVotes`, limbs as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyCalldata {
    pub a: [String; 2],
    pub b: [[String; 2]; 2],
    pub c: [String; 2],
    pub pub_signals: Vec<String>,
}

/// Receipt of a confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
}

/// Block-range event query capability plus height and transaction
/// submission, as consumed by the orchestrator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn election_created(&self, window: BlockWindow) -> Result<Vec<ElectionCreatedEvent>>;

    async fn election_bounds(&self, election_id: u64) -> Result<ElectionBounds>;

    async fn votes_cast(&self, election_id: u64, window: BlockWindow)
        -> Result<Vec<VoteCastEvent>>;

    async fn submit_tally(
        &self,
        election_id: u64,
        calldata: &TallyCalldata,
    ) -> Result<SubmissionReceipt>;
}

/// Alloy client configuration.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub manager_address: Address,
    pub private_key: String,
    pub chain_id: u64,
    pub request_timeout: Duration,
}

impl ChainConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Option<Self> {
        let rpc_url = std::env::var("EVM_RPC").ok()?;
        let manager_address = std::env::var("ELECTION_MANAGER")
            .ok()
            .and_then(|s| s.parse().ok())?;
        let private_key = std::env::var("ORCHESTRATOR_KEY").ok()?;
        let chain_id = std::env::var("CHAIN_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(31337);
        let request_timeout = std::env::var("CHAIN_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Some(Self {
            rpc_url,
            manager_address,
            private_key,
            chain_id,
            request_timeout,
        })
    }
}

/// Alloy-backed chain client.
pub struct AlloyChainClient {
    config: ChainConfig,
}

impl AlloyChainClient {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn timed<T, F>(&self, context: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| PipelineError::ChainUnavailable(format!("{context} timed out")))?
    }

    fn read_provider(&self) -> Result<impl Provider<Http<Client>>> {
        let url = self
            .config
            .rpc_url
            .parse()
            .map_err(|e| PipelineError::Configuration(format!("invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    fn signer_provider(&self) -> Result<impl Provider<Http<Client>>> {
        let signer: PrivateKeySigner = self
            .config
            .private_key
            .parse()
            .map_err(|e| PipelineError::Configuration(format!("invalid private key: {e}")))?;

        let url = self
            .config
            .rpc_url
            .parse()
            .map_err(|e| PipelineError::Configuration(format!("invalid RPC URL: {e}")))?;

        Ok(ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(url))
    }

    fn window_filter(&self, window: BlockWindow) -> Filter {
        Filter::new()
            .address(self.config.manager_address)
            .from_block(window.from)
            .to_block(window.to)
    }
}

fn parse_limb(s: &str, path: &str) -> Result<U256> {
    s.parse::<U256>()
        .map_err(|e| PipelineError::Internal(format!("invalid calldata limb {path}: {e}")))
}

fn calldata_signals(calldata: &TallyCalldata) -> Result<[U256; 7]> {
    if calldata.pub_signals.len() != 7 {
        return Err(PipelineError::Internal(format!(
            "tally calldata needs 7 public signals, got {}",
            calldata.pub_signals.len()
        )));
    }

    let mut signals = [U256::ZERO; 7];
    for (i, s) in calldata.pub_signals.iter().enumerate() {
        signals[i] = parse_limb(s, &format!("pubSignals[{i}]"))?;
    }
    Ok(signals)
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn block_number(&self) -> Result<u64> {
        let provider = self.read_provider()?;
        self.timed("block_number", async {
            provider
                .get_block_number()
                .await
                .map_err(|e| PipelineError::ChainUnavailable(format!("get_block_number: {e}")))
        })
        .await
    }

    async fn election_created(&self, window: BlockWindow) -> Result<Vec<ElectionCreatedEvent>> {
        let provider = self.read_provider()?;
        let filter = self
            .window_filter(window)
            .event_signature(IElectionManager::ElectionCreated::SIGNATURE_HASH);

        let logs = self
            .timed("get_logs(ElectionCreated)", async {
                provider
                    .get_logs(&filter)
                    .await
                    .map_err(|e| PipelineError::ChainUnavailable(format!("get_logs: {e}")))
            })
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let decoded = IElectionManager::ElectionCreated::decode_log(&log.inner, true)
                .map_err(|e| PipelineError::Internal(format!("decode ElectionCreated: {e}")))?;
            events.push(ElectionCreatedEvent {
                election_id: decoded.data.id.to::<u64>(),
                meta: hex::encode(decoded.data.meta),
                block_number: log.block_number.unwrap_or(window.from),
            });
        }

        Ok(events)
    }

    async fn election_bounds(&self, election_id: u64) -> Result<ElectionBounds> {
        let provider = self.read_provider()?;
        let contract = IElectionManager::new(self.config.manager_address, &provider);

        let bounds = self
            .timed("elections()", async {
                contract
                    .elections(U256::from(election_id))
                    .call()
                    .await
                    .map_err(|e| PipelineError::ChainUnavailable(format!("elections(): {e}")))
            })
            .await?;

        Ok(ElectionBounds {
            start_block: bounds.startBlock,
            end_block: bounds.endBlock,
        })
    }

    async fn votes_cast(
        &self,
        election_id: u64,
        window: BlockWindow,
    ) -> Result<Vec<VoteCastEvent>> {
        let provider = self.read_provider()?;
        let filter = self
            .window_filter(window)
            .event_signature(IElectionManager::VoteCast::SIGNATURE_HASH)
            .topic1(U256::from(election_id));

        let logs = self
            .timed("get_logs(VoteCast)", async {
                provider
                    .get_logs(&filter)
                    .await
                    .map_err(|e| PipelineError::ChainUnavailable(format!("get_logs: {e}")))
            })
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let decoded = IElectionManager::VoteCast::decode_log(&log.inner, true)
                .map_err(|e| PipelineError::Internal(format!("decode VoteCast: {e}")))?;
            events.push(VoteCastEvent {
                election_id: decoded.data.id.to::<u64>(),
                option: decoded.data.option.to::<u32>(),
                credits: decoded.data.credits.to::<u64>(),
                block_number: log.block_number.unwrap_or(window.from),
            });
        }

        Ok(events)
    }

    async fn submit_tally(
        &self,
        _election_id: u64,
        calldata: &TallyCalldata,
    ) -> Result<SubmissionReceipt> {
        let a = [
            parse_limb(&calldata.a[0], "a[0]")?,
            parse_limb(&calldata.a[1], "a[1]")?,
        ];
        let b = [
            [
                parse_limb(&calldata.b[0][0], "b[0][0]")?,
                parse_limb(&calldata.b[0][1], "b[0][1]")?,
            ],
            [
                parse_limb(&calldata.b[1][0], "b[1][0]")?,
                parse_limb(&calldata.b[1][1], "b[1][1]")?,
            ],
        ];
        let c = [
            parse_limb(&calldata.c[0], "c[0]")?,
            parse_limb(&calldata.c[1], "c[1]")?,
        ];
        let signals = calldata_signals(calldata)?;

        let provider = self.signer_provider()?;
        let contract = IElectionManager::new(self.config.manager_address, &provider);

        let receipt = self
            .timed("tallyVotes", async {
                let pending = contract
                    .tallyVotes(a, b, c, signals)
                    .send()
                    .await
                    .map_err(|e| {
                        PipelineError::ChainUnavailable(format!("send tallyVotes: {e}"))
                    })?;

                tracing::info!(tx_hash = %pending.tx_hash(), "tally transaction sent");

                pending.get_receipt().await.map_err(|e| {
                    PipelineError::ChainUnavailable(format!("wait for receipt: {e}"))
                })
            })
            .await?;

        if !receipt.status() {
            return Err(PipelineError::SubmissionFailed {
                attempts: 1,
                last_error: format!(
                    "transaction reverted: {}",
                    hex::encode(receipt.transaction_hash)
                ),
            });
        }

        Ok(SubmissionReceipt {
            tx_hash: hex::encode(receipt.transaction_hash),
            block_number: receipt.block_number.unwrap_or(0),
            block_hash: receipt
                .block_hash
                .map(hex::encode)
                .unwrap_or_default(),
        })
    }
}
