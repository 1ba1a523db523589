//! Chain-state orchestrator daemon.
//!
//! Watches the configured election on chain, waits out the voting
//! deadline, proves the tally, submits it, and optionally relays the
//! result to a mirror chain. Runs one election cycle to a terminal state.

use std::sync::Arc;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use zkvote_pipeline::domain::CircuitManifest;
use zkvote_pipeline::infra::{DeadLetterStore, MemoryDeadLetterStore, PgDeadLetterStore};
use zkvote_pipeline::orchestrator::{
    AlloyChainClient, ChainConfig, EvmMirrorRelay, Orchestrator, OrchestratorConfig, RelayConfig,
    RelaySink, RunOutcome,
};
use zkvote_pipeline::prover::{DeterministicProver, Prover, SnarkjsProver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("Starting orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let chain_config = ChainConfig::from_env().ok_or_else(|| {
        anyhow::anyhow!("EVM_RPC, ELECTION_MANAGER and ORCHESTRATOR_KEY must be set")
    })?;
    info!("  RPC URL: {}", chain_config.rpc_url);
    info!("  Manager: {:?}", chain_config.manager_address);
    info!("  Chain ID: {}", chain_config.chain_id);
    let chain = Arc::new(AlloyChainClient::new(chain_config));

    let dead_letters: Arc<dyn DeadLetterStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(4)
                .connect(&url)
                .await?;
            let store = PgDeadLetterStore::new(pool);
            store.initialize().await?;
            Arc::new(store)
        }
        Err(_) => {
            info!("DATABASE_URL not set; dead letters are held in memory only");
            Arc::new(MemoryDeadLetterStore::new())
        }
    };

    let manifest_path = std::env::var("CIRCUIT_MANIFEST")
        .unwrap_or_else(|_| "artifacts/manifest.json".to_string());
    let manifest = CircuitManifest::load(std::path::Path::new(&manifest_path));

    let prover: Arc<dyn Prover> = match std::env::var("PROVER").as_deref() {
        Ok("deterministic") => Arc::new(DeterministicProver::new()),
        _ => Arc::new(SnarkjsProver::new(manifest)),
    };

    let relay: Option<Arc<dyn RelaySink>> = match RelayConfig::from_env() {
        Some(relay_config) => {
            info!("Relay configured:");
            info!("  RPC URL: {}", relay_config.rpc_url);
            info!("  Mirror: {:?}", relay_config.mirror_address);
            Some(Arc::new(EvmMirrorRelay::new(relay_config)))
        }
        None => {
            info!("Relay not configured (set RELAY_RPC, RELAY_MIRROR_ADDRESS, RELAY_KEY to enable)");
            None
        }
    };

    let config = OrchestratorConfig::from_env();
    info!("  Election: {}", config.election_id);
    info!("  Scan window: {} blocks", config.scan_window);
    info!("  Confirmations: {}", config.confirmations);

    let mut orchestrator = Orchestrator::new(chain, prover, dead_letters, relay, config);

    match orchestrator.run().await {
        Ok(RunOutcome::Completed {
            tx_hash,
            totals,
            relayed,
        }) => {
            info!(tx_hash = %tx_hash, ?totals, relayed, "election cycle completed");
            Ok(())
        }
        Ok(RunOutcome::DeadLettered { record_id }) => {
            // Recorded, not crashed: the failure is inspectable and the
            // payload replayable by an operator.
            error!(record_id, "election cycle ended in dead letter");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "orchestrator failed");
            Err(e.into())
        }
    }
}
