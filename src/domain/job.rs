//! Asynchronous proof job state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ProofBundle;

/// Job identifier handed back on enqueue.
pub type JobId = Uuid;

/// Lifecycle of one proof-generation job.
///
/// `Done` and `Error` are terminal: once reached, every subsequent poll
/// returns the same snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a job, as returned by polls and the progress
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    /// Percentage 0..=100 while the worker reports progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProofBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSnapshot {
    pub fn pending(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Pending,
            progress: Some(0),
            result: None,
            error: None,
        }
    }
}
