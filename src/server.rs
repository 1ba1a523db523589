//! HTTP server bootstrap for the proof pipeline.
//!
//! This module wires together:
//! - configuration
//! - store selection (PostgreSQL when `DATABASE_URL` is set, in-memory otherwise)
//! - the circuit registry, prover, and job pipeline
//! - the Axum router

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::domain::CircuitManifest;
use crate::infra::{
    AdmissionStore, AuditStore, CircuitStore, DeadLetterStore, MemoryAdmissionStore,
    MemoryAuditStore, MemoryCircuitStore, MemoryDeadLetterStore, PgAdmissionStore, PgAuditStore,
    PgCircuitStore, PgDeadLetterStore,
};
use crate::pipeline::{CircuitRegistry, JobPipeline, PipelineConfig};
use crate::prover::{DeterministicProver, Prover, SnarkjsProver};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; absent means in-memory stores.
    pub database_url: Option<String>,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Circuit manifest path.
    pub manifest_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .expect("Invalid listen address");

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let manifest_path = std::env::var("CIRCUIT_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("artifacts/manifest.json"));

        Self {
            database_url,
            listen_addr,
            max_connections,
            manifest_path,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<JobPipeline>,
    pub audits: Arc<dyn AuditStore>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
}

/// The pipeline's backing stores, selected at startup.
pub struct Stores {
    pub admission: Arc<dyn AdmissionStore>,
    pub circuits: Arc<dyn CircuitStore>,
    pub audits: Arc<dyn AuditStore>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
}

impl Stores {
    /// In-memory stores for DB-less operation and tests.
    pub fn in_memory() -> Self {
        Self {
            admission: Arc::new(MemoryAdmissionStore::new()),
            circuits: Arc::new(MemoryCircuitStore::new()),
            audits: Arc::new(MemoryAuditStore::new()),
            dead_letters: Arc::new(MemoryDeadLetterStore::new()),
        }
    }

    /// PostgreSQL stores, creating tables on first use.
    pub async fn postgres(pool: sqlx::PgPool) -> crate::infra::Result<Self> {
        let admission = PgAdmissionStore::new(pool.clone());
        admission.initialize().await?;
        let circuits = PgCircuitStore::new(pool.clone());
        circuits.initialize().await?;
        let audits = PgAuditStore::new(pool.clone());
        audits.initialize().await?;
        let dead_letters = PgDeadLetterStore::new(pool);
        dead_letters.initialize().await?;

        Ok(Self {
            admission: Arc::new(admission),
            circuits: Arc::new(circuits),
            audits: Arc::new(audits),
            dead_letters: Arc::new(dead_letters),
        })
    }
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting zkvote-pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Circuit manifest: {}", config.manifest_path.display());

    let stores = match &config.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;
            info!("Connected to PostgreSQL");
            Stores::postgres(pool).await?
        }
        None => {
            info!("DATABASE_URL not set; using in-memory stores (state is volatile)");
            Stores::in_memory()
        }
    };

    let manifest = CircuitManifest::load(&config.manifest_path);
    let state = build_state(stores, manifest, PipelineConfig::from_env());

    let app = build_router()?.with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("zkvote-pipeline is ready to accept connections");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire the pipeline and its collaborators into shared state.
pub fn build_state(
    stores: Stores,
    manifest: CircuitManifest,
    pipeline_config: PipelineConfig,
) -> AppState {
    let registry = CircuitRegistry::new(stores.circuits, manifest.clone());

    let prover: Arc<dyn Prover> = match std::env::var("PROVER").as_deref() {
        Ok("deterministic") => {
            info!("PROVER=deterministic; snarkjs toolchain disabled");
            Arc::new(DeterministicProver::new())
        }
        _ => Arc::new(SnarkjsProver::new(manifest)),
    };

    let pipeline = JobPipeline::new(
        registry,
        prover,
        stores.admission,
        stores.audits.clone(),
        pipeline_config,
    );

    AppState {
        pipeline,
        audits: stores.audits,
        dead_letters: stores.dead_letters,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// Build the application router.
pub fn build_router() -> anyhow::Result<Router<AppState>> {
    let mut router = Router::new()
        .merge(crate::api::router())
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "zkvote-pipeline",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, (axum::http::StatusCode, String)> {
    // A store round trip proves the backing database is reachable.
    match state.audits.list(0, 1).await {
        Ok(_) => Ok(axum::Json(serde_json::json!({
            "status": "ready",
            "stores": "connected",
        }))),
        Err(e) => Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            format!("Store unavailable: {}", e),
        )),
    }
}
