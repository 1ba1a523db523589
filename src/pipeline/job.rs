//! In-process job table
//!
//! Tracks every asynchronous proof job from enqueue to terminal state.
//! Terminal states are write-once: a completed or failed job can be polled
//! forever and always returns the same snapshot.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{JobId, JobSnapshot, JobState, ProofBundle};

#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<JobId, JobSnapshot>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job.
    pub async fn create(&self) -> JobId {
        let id = Uuid::new_v4();
        self.jobs.write().await.insert(id, JobSnapshot::pending(id));
        id
    }

    pub async fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Move a job to `running` with a progress percentage.
    pub async fn set_running(&self, id: &JobId, progress: u8) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if !job.state.is_terminal() {
                job.state = JobState::Running;
                job.progress = Some(progress.min(100));
            }
        }
    }

    /// Record a successful result and transition to `done`.
    pub async fn complete(&self, id: &JobId, result: ProofBundle) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if !job.state.is_terminal() {
                job.state = JobState::Done;
                job.progress = Some(100);
                job.result = Some(result);
                job.error = None;
            }
        }
    }

    /// Record a failure and transition to `error`.
    pub async fn fail(&self, id: &JobId, error: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if !job.state.is_terminal() {
                job.state = JobState::Error;
                job.error = Some(error);
            }
        }
    }
}
