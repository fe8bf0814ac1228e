//! The two caching strategies and the seam they share.

pub mod annotated;
pub mod managed;

use async_trait::async_trait;
use serde::Serialize;

pub use annotated::AnnotatedCache;
pub use managed::{CachePolicies, ManagedCache};

/// A read-through cache in front of the file repository.
#[async_trait]
pub trait ValueCache: Send + Sync {
    /// Short identifier used in logs and HTTP responses.
    fn name(&self) -> &'static str;

    /// Return the cached value, loading it from the repository on a miss.
    /// Keys absent from the repository are never cached.
    async fn get(&self, key: &str) -> Option<String>;

    async fn invalidate(&self, key: &str);

    async fn invalidate_all(&self);

    async fn stats(&self) -> CacheStats;
}

/// Point-in-time cache statistics.
///
/// Caches that don't record statistics leave every counter at zero and
/// only fill in `entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub load_successes: u64,
    pub load_failures: u64,
    /// Size- and expiry-based removals. Explicit invalidations don't count.
    pub evictions: u64,
    pub entries: u64,
    pub total_load_time_ns: u64,
}

impl CacheStats {
    pub fn requests(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    /// Fraction of requests served from the cache; `1.0` before any request.
    pub fn hit_rate(&self) -> f64 {
        match self.requests() {
            0 => 1.0,
            n => self.hits as f64 / n as f64,
        }
    }

    pub fn miss_rate(&self) -> f64 {
        match self.requests() {
            0 => 0.0,
            n => self.misses as f64 / n as f64,
        }
    }

    /// Mean time spent loading a value, in milliseconds.
    pub fn average_load_penalty_ms(&self) -> f64 {
        let loads = self.load_successes.saturating_add(self.load_failures);
        if loads == 0 {
            return 0.0;
        }
        self.total_load_time_ns as f64 / loads as f64 / 1_000_000.0
    }
}
