//! Daily proof quota enforcement
//!
//! One counter per `(identity, day)` bucket, incremented atomically with a
//! quota ceiling by the backing store. Counters age out by day key; they
//! are never deleted.

use std::sync::Arc;

use chrono::Utc;

use crate::infra::{AdmissionStore, Result};

pub struct AdmissionController {
    store: Arc<dyn AdmissionStore>,
    quota: u32,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn AdmissionStore>, quota: u32) -> Self {
        Self { store, quota }
    }

    /// Current UTC day bucket.
    pub fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Consume one quota unit for the identity's current day bucket.
    ///
    /// Returns whether the unit was granted. Admission is charged before
    /// any cache lookup, so cache hits consume quota too.
    pub async fn try_admit(&self, identity: &str) -> Result<bool> {
        self.store
            .try_admit(identity, &Self::today(), self.quota)
            .await
    }

    /// Remaining quota for the current day bucket, clamped at zero.
    pub async fn remaining(&self, identity: &str) -> Result<u32> {
        let used = self.store.used(identity, &Self::today()).await?;
        Ok(self.quota.saturating_sub(used))
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }
}
