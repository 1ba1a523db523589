//! Audit ledger and dead-letter inspection handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;
use tracing::instrument;

use crate::api::error::ApiError;
use crate::api::types::PageQuery;
use crate::infra::{AuditStore, DeadLetterStore};
use crate::server::AppState;

/// GET /api/proofs - Recent proof audit records, most recent first.
#[instrument(skip(state))]
pub async fn list_audits(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (offset, limit) = page.clamped();
    let records = state.audits.list(offset, limit).await?;
    Ok(Json(json!({ "audits": records })))
}

/// GET /api/dead-letters - Operator view of permanently failed work.
///
/// Read-only: requeueing a dead letter is manual remediation.
#[instrument(skip(state))]
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (offset, limit) = page.clamped();
    let records = state.dead_letters.list(offset, limit).await?;
    let total = state.dead_letters.count().await?;
    Ok(Json(json!({
        "dead_letters": records,
        "total": total,
    })))
}
