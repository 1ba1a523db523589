//! REST surface of the proof job pipeline
//!
//! This is the pipeline's own boundary: submission, polling, progress
//! streaming, quota, and operator inspection. Election-metadata CRUD and
//! login live in other services.

pub mod error;
pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;

use crate::server::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/zk/:circuit", post(handlers::proofs::submit_proof))
        .route(
            "/api/zk/:circuit/:job_id",
            get(handlers::proofs::proof_status),
        )
        .route("/ws/proofs/:job_id", get(handlers::proofs::proof_stream))
        .route("/api/quota", get(handlers::proofs::quota))
        .route("/api/proofs", get(handlers::audits::list_audits))
        .route(
            "/api/dead-letters",
            get(handlers::audits::list_dead_letters),
        )
}
