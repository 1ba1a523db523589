//! Proof submission, polling, progress streaming, and quota handlers.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::api::error::{ApiError, ErrorCode};
use crate::domain::{CurveId, JobId, JobSnapshot, JobState, ProofBundle};
use crate::pipeline::SubmitOutcome;
use crate::server::AppState;

/// Pseudonymous identity from the `x-user-key` header.
///
/// The login flow that mints these keys lives outside this service; the
/// pipeline only needs a stable string per caller for quota buckets.
fn identity(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::new(ErrorCode::IdentityRequired, "x-user-key header required"))
}

/// Curve selection from the `x-curve` header, defaulting to bn254.
fn curve(headers: &HeaderMap) -> Result<CurveId, ApiError> {
    match headers.get("x-curve").map(|v| v.to_str().unwrap_or("")) {
        None => Ok(CurveId::default()),
        Some(raw) => raw
            .parse()
            .map_err(|e: String| ApiError::new(ErrorCode::MalformedInput, e)),
    }
}

fn done_body(bundle: &ProofBundle) -> serde_json::Value {
    json!({
        "status": "done",
        "proof": bundle.proof,
        "pub_signals": bundle.pub_signals,
    })
}

/// POST /api/zk/:circuit - Submit a proof request.
///
/// A cache hit returns the completed result immediately; otherwise the
/// response carries the job id to poll. The two cases are distinguished
/// by shape, not status code alone.
#[instrument(skip(state, headers, inputs), fields(circuit = %circuit))]
pub async fn submit_proof(
    State(state): State<AppState>,
    Path(circuit): Path<String>,
    headers: HeaderMap,
    Json(inputs): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let identity = identity(&headers)?;
    let curve = curve(&headers)?;

    let outcome = state
        .pipeline
        .submit(&identity, &circuit, curve, inputs)
        .await?;

    match outcome {
        SubmitOutcome::Cached(bundle) => {
            debug!("cache hit, returning immediate result");
            Ok((StatusCode::OK, Json(done_body(&bundle))).into_response())
        }
        SubmitOutcome::Enqueued(job_id) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({"job_id": job_id})),
        )
            .into_response()),
    }
}

fn snapshot_body(snapshot: &JobSnapshot) -> serde_json::Value {
    match snapshot.state {
        JobState::Done => {
            // Terminal result always carries the bundle
            match &snapshot.result {
                Some(bundle) => done_body(bundle),
                None => json!({"status": "done"}),
            }
        }
        JobState::Error => json!({
            "status": "error",
            "detail": snapshot.error,
        }),
        state => json!({
            "status": state,
            "progress": snapshot.progress,
        }),
    }
}

/// GET /api/zk/:circuit/:job_id - Poll job status.
#[instrument(skip(state), fields(job_id = %job_id))]
pub async fn proof_status(
    State(state): State<AppState>,
    Path((_circuit, job_id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.pipeline.status(&job_id).await?;
    Ok(Json(snapshot_body(&snapshot)))
}

/// GET /ws/proofs/:job_id - Progress stream over a WebSocket.
///
/// Emits `{state, progress}` snapshots at the configured cadence until
/// terminal, then one final snapshot, then closes. The job runs whether
/// or not anyone is watching.
pub async fn proof_stream(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let rx = state.pipeline.stream(&job_id).await?;
    Ok(ws.on_upgrade(move |socket| pump_stream(socket, job_id, rx)))
}

async fn pump_stream(
    mut socket: WebSocket,
    job_id: JobId,
    mut rx: tokio::sync::mpsc::Receiver<JobSnapshot>,
) {
    while let Some(snapshot) = rx.recv().await {
        let frame = json!({
            "state": snapshot.state,
            "progress": snapshot.progress.unwrap_or(0),
        });
        let text = frame.to_string();
        if socket.send(Message::Text(text)).await.is_err() {
            debug!(%job_id, "stream consumer disconnected");
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// GET /api/quota - Remaining proof quota for the caller's day bucket.
#[instrument(skip(state, headers))]
pub async fn quota(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = identity(&headers)?;
    let left = state.pipeline.remaining(&identity).await?;
    Ok(Json(json!({"left": left})))
}
