//! Request/response types for the API surface.

use serde::Deserialize;

fn default_limit() -> i64 {
    50
}

/// Pagination query for audit and dead-letter listings.
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PageQuery {
    /// Clamp to sane bounds before hitting a store.
    pub fn clamped(&self) -> (i64, i64) {
        (self.offset.max(0), self.limit.clamp(1, 500))
    }
}
