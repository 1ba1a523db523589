//! Error types for the proof pipeline and orchestrator

use thiserror::Error;
use uuid::Uuid;

use crate::domain::CurveId;

/// Errors that can occur in the pipeline infrastructure
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Admission denied: identity exhausted its daily proof quota
    #[error("proof quota exceeded")]
    QuotaExceeded,

    /// No registry record or manifest entry for the circuit/curve pair
    #[error("unknown circuit: {name} ({curve})")]
    UnknownCircuit { name: String, curve: CurveId },

    /// Caller-supplied inputs failed schema/range validation
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The proving toolchain errored and the deterministic stand-in could
    /// not run either
    #[error("prover failure: {0}")]
    ProverFailure(String),

    /// Transient connectivity failure to the blockchain endpoint
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    /// On-chain transaction failed or reverted after exhausting retries
    #[error("submission failed after {attempts} attempts: {last_error}")]
    SubmissionFailed { attempts: u32, last_error: String },

    /// Secondary-chain relay failure
    #[error("relay failure: {0}")]
    RelayFailure(String),

    /// Polled job id was never issued by this pipeline
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the error is worth retrying with backoff.
    ///
    /// Only chain connectivity failures are transient; everything else is
    /// either caller-visible or permanently fatal for the unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::ChainUnavailable(_))
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(PipelineError::ChainUnavailable("rpc down".into()).is_transient());
        assert!(!PipelineError::QuotaExceeded.is_transient());
        assert!(!PipelineError::ProverFailure("no artifacts".into()).is_transient());
        assert!(!PipelineError::SubmissionFailed {
            attempts: 5,
            last_error: "reverted".into()
        }
        .is_transient());
    }
}
