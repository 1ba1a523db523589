//! Content-addressed proof memo store
//!
//! Maps `fingerprint = SHA256(JCS(inputs) || circuit_hash)` to a previously
//! computed proof bundle. Shared across all job workers; reads and writes
//! are safe under concurrency and `put` is idempotent (results are
//! deterministic per fingerprint, so last-write-wins converges).
//!
//! A circuit version flip changes every fingerprint, so stale entries stop
//! resolving without explicit invalidation. Entries are bounded by an LRU
//! cap rather than a TTL; a miss only costs a recompute.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

use crate::domain::{Hash256, ProofBundle};

struct CacheEntry {
    bundle: ProofBundle,
    last_accessed: Instant,
}

/// Cache statistics
#[derive(Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Content-addressed proof cache.
pub struct ProofCache {
    max_entries: usize,
    entries: RwLock<HashMap<Hash256, CacheEntry>>,
    stats: CacheStats,
}

impl ProofCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Get a cached bundle by fingerprint.
    pub async fn get(&self, fingerprint: &Hash256) -> Option<ProofBundle> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(fingerprint) {
            entry.last_accessed = Instant::now();
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.bundle.clone());
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a bundle. Idempotent: re-inserting the same fingerprint
    /// overwrites with an equal value.
    pub async fn put(&self, fingerprint: Hash256, bundle: ProofBundle) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&fingerprint) {
            self.evict_oldest(&mut entries);
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                bundle,
                last_accessed: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn evict_oldest(&self, entries: &mut HashMap<Hash256, CacheEntry>) {
        if let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| *k)
        {
            entries.remove(&oldest);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for ProofCache {
    fn default() -> Self {
        // Generous cap: reproduces the reference "never evict" behavior for
        // any realistic workload while bounding worst-case memory.
        Self::new(100_000)
    }
}
