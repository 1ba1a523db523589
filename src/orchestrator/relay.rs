//! Cross-chain result relay
//!
//! After a successful primary submission, the finalized tally is mirrored
//! to a second chain. The relay target is addressed by a deterministic
//! reference derived from the finalized block hash, so replays land on
//! the same mirror account. The relay leg has its own retry and
//! dead-letter policy, fully decoupled from the primary submission.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, FixedBytes, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::infra::{PipelineError, Result};

// Mirror-contract bindings on the secondary chain
sol! {
    #[sol(rpc)]
    interface IElectionMirror {
        function setTally(bytes32 reference, uint256 electionId, uint256[] totals) external;
    }
}

/// Destination for finalized tallies on a secondary chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RelaySink: Send + Sync {
    /// Mirror the finalized totals under the given stable reference.
    async fn relay(&self, reference: &str, election_id: u64, totals: &[u64]) -> Result<()>;
}

/// Relay configuration; absent env vars disable the relay leg.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub rpc_url: String,
    pub mirror_address: Address,
    pub private_key: String,
}

impl RelayConfig {
    pub fn from_env() -> Option<Self> {
        let rpc_url = std::env::var("RELAY_RPC").ok()?;
        let mirror_address = std::env::var("RELAY_MIRROR_ADDRESS")
            .ok()
            .and_then(|s| s.parse().ok())?;
        let private_key = std::env::var("RELAY_KEY").ok()?;

        Some(Self {
            rpc_url,
            mirror_address,
            private_key,
        })
    }
}

/// Relay to an EVM mirror contract on the secondary chain.
pub struct EvmMirrorRelay {
    config: RelayConfig,
}

impl EvmMirrorRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RelaySink for EvmMirrorRelay {
    async fn relay(&self, reference: &str, election_id: u64, totals: &[u64]) -> Result<()> {
        let reference_bytes = hex::decode(reference)
            .ok()
            .and_then(|b| <[u8; 32]>::try_from(b).ok())
            .ok_or_else(|| {
                PipelineError::RelayFailure(format!("relay reference is not 32 bytes: {reference}"))
            })?;

        let signer: PrivateKeySigner = self
            .config
            .private_key
            .parse()
            .map_err(|e| PipelineError::Configuration(format!("invalid relay key: {e}")))?;

        let url = self
            .config
            .rpc_url
            .parse()
            .map_err(|e| PipelineError::Configuration(format!("invalid relay RPC URL: {e}")))?;

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(url);

        let contract = IElectionMirror::new(self.config.mirror_address, &provider);
        let totals: Vec<U256> = totals.iter().map(|&t| U256::from(t)).collect();

        let pending = contract
            .setTally(
                FixedBytes::from(reference_bytes),
                U256::from(election_id),
                totals,
            )
            .send()
            .await
            .map_err(|e| PipelineError::RelayFailure(format!("send setTally: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| PipelineError::RelayFailure(format!("wait for relay receipt: {e}")))?;

        if !receipt.status() {
            return Err(PipelineError::RelayFailure(format!(
                "relay transaction reverted: {}",
                hex::encode(receipt.transaction_hash)
            )));
        }

        tracing::info!(
            reference,
            election_id,
            tx_hash = %hex::encode(receipt.transaction_hash),
            "tally relayed to mirror chain"
        );

        Ok(())
    }
}
