//! Structured API error responses with error codes
//!
//! Machine-readable error codes and human-readable messages, consistent
//! across all endpoints. Codes are stable for programmatic handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::PipelineError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No identity header provided
    IdentityRequired,
    /// Daily proof quota exhausted
    QuotaExceeded,
    /// Request inputs failed validation
    MalformedInput,
    /// No registry or manifest entry for the circuit/curve pair
    UnknownCircuit,
    /// Polled job id was never issued
    JobNotFound,
    /// Database operation failed
    DatabaseError,
    /// Chain endpoint unreachable
    ChainUnavailable,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::IdentityRequired => 1001,
            ErrorCode::QuotaExceeded => 2002,
            ErrorCode::MalformedInput => 3001,
            ErrorCode::UnknownCircuit => 4001,
            ErrorCode::JobNotFound => 4002,
            ErrorCode::DatabaseError => 8001,
            ErrorCode::ChainUnavailable => 8002,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::IdentityRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::MalformedInput => StatusCode::BAD_REQUEST,
            ErrorCode::UnknownCircuit => StatusCode::NOT_FOUND,
            ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ChainUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::IdentityRequired => "IDENTITY_REQUIRED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::MalformedInput => "MALFORMED_INPUT",
            ErrorCode::UnknownCircuit => "UNKNOWN_CIRCUIT",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ChainUnavailable => "CHAIN_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

/// Structured error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match &err {
            PipelineError::QuotaExceeded => {
                ApiError::new(ErrorCode::QuotaExceeded, err.to_string())
            }
            PipelineError::UnknownCircuit { .. } => {
                ApiError::new(ErrorCode::UnknownCircuit, err.to_string())
            }
            PipelineError::MalformedInput(_) => {
                ApiError::new(ErrorCode::MalformedInput, err.to_string())
            }
            PipelineError::JobNotFound(_) => ApiError::new(ErrorCode::JobNotFound, err.to_string()),
            PipelineError::Database(_) => ApiError::new(ErrorCode::DatabaseError, err.to_string()),
            PipelineError::ChainUnavailable(_) => {
                ApiError::new(ErrorCode::ChainUnavailable, err.to_string())
            }
            _ => ApiError::new(ErrorCode::InternalError, err.to_string()),
        }
    }
}
