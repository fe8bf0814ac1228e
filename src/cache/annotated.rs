//! Annotation-style memoizing cache.
//!
//! The lookup is memoized per key in an unbounded concurrent map, the way a
//! declarative "cache this method's result" attribute would do it: no size
//! limit, no expiry, no statistics. Only explicit invalidation removes
//! entries. `None` results are not memoized.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{CacheStats, ValueCache};
use crate::repository::FileRepository;

/// Unbounded per-key memoization of an async lookup.
///
/// Concurrent first calls for the same key may each run the loader; the
/// last writer wins.
#[derive(Debug, Default)]
pub struct Memoized {
    entries: DashMap<String, String>,
}

impl Memoized {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized value for `key`, or run `load` and remember a
    /// `Some` result.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        if let Some(hit) = self.entries.get(key) {
            return Some(hit.value().clone());
        }
        let value = load().await?;
        self.entries.insert(key.to_string(), value.clone());
        Some(value)
    }

    pub fn evict(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Memoizing cache over [`FileRepository::find`].
#[derive(Clone)]
pub struct AnnotatedCache {
    memo: Arc<Memoized>,
    repository: FileRepository,
}

impl AnnotatedCache {
    pub fn new(repository: FileRepository) -> Self {
        Self {
            memo: Arc::new(Memoized::new()),
            repository,
        }
    }
}

#[async_trait]
impl ValueCache for AnnotatedCache {
    fn name(&self) -> &'static str {
        "annotated"
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.memo
            .get_or_load(key, || {
                debug!(key = %key, "Annotated cache miss, loading from repository");
                self.repository.find(key)
            })
            .await
    }

    async fn invalidate(&self, key: &str) {
        self.memo.evict(key);
    }

    async fn invalidate_all(&self) {
        self.memo.clear();
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.memo.len() as u64,
            ..Default::default()
        }
    }
}
