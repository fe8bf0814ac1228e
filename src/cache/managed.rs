//! Managed cache: bounded, with expiry and refresh policies and statistics.
//!
//! Backed by a moka [`Cache`]. Every policy comes from [`CachePolicies`]
//! (usually built from [`ManagedCacheConfig`]):
//!
//! - `max_capacity`: size-based eviction once the entry count is exceeded
//! - `expire_after_write`: entries die this long after insertion
//! - `expire_after_access`: entries die this long after the last read
//! - `refresh_after_write`: a hit on an older entry returns the current value
//!   and reloads it in the background, once per key at a time
//!
//! Concurrent misses on the same key share a single repository load.
//!
//! Invalidation bumps an epoch. A load or refresh that straddles an epoch
//! change never writes pre-invalidation data back into the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::ops::compute::Op;
use tracing::{debug, info};

use super::{CacheStats, ValueCache};
use crate::config::ManagedCacheConfig;
use crate::repository::FileRepository;

/// Resolved policies for a [`ManagedCache`]. `None` disables a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicies {
    pub max_capacity: u64,
    pub expire_after_write: Option<Duration>,
    pub expire_after_access: Option<Duration>,
    pub refresh_after_write: Option<Duration>,
    pub record_stats: bool,
}

impl From<&ManagedCacheConfig> for CachePolicies {
    fn from(cfg: &ManagedCacheConfig) -> Self {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Self {
            max_capacity: cfg.max_capacity.max(1),
            expire_after_write: secs(cfg.expire_after_write_secs),
            expire_after_access: secs(cfg.expire_after_access_secs),
            refresh_after_write: secs(cfg.refresh_after_write_secs),
            record_stats: cfg.record_stats,
        }
    }
}

/// A cached value plus the instant it was written, for refresh decisions.
#[derive(Debug)]
struct CachedValue {
    value: String,
    written_at: Instant,
}

impl CachedValue {
    fn new(value: String) -> Arc<Self> {
        Arc::new(Self {
            value,
            written_at: Instant::now(),
        })
    }
}

/// Lock-free counters; only updated when stats recording is on.
#[derive(Debug, Default)]
struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
    total_load_time_ns: AtomicU64,
}

impl StatsCounter {
    fn record_load(&self, found: bool, elapsed: Duration) {
        if found {
            self.load_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_load_time_ns.fetch_add(ns, Ordering::Relaxed);
    }

    fn snapshot(&self, entries: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
            total_load_time_ns: self.total_load_time_ns.load(Ordering::Relaxed),
        }
    }
}

/// Explicitly configured cache over a [`FileRepository`].
///
/// Clone is cheap; clones share entries and counters.
#[derive(Clone)]
pub struct ManagedCache {
    inner: Cache<String, Arc<CachedValue>>,
    repository: FileRepository,
    policies: CachePolicies,
    counters: Option<Arc<StatsCounter>>,
    refreshing: Arc<DashMap<String, ()>>,
    epoch: Arc<AtomicU64>,
}

impl ManagedCache {
    pub fn new(repository: FileRepository, config: &ManagedCacheConfig) -> Self {
        Self::with_policies(repository, CachePolicies::from(config))
    }

    pub fn with_policies(repository: FileRepository, policies: CachePolicies) -> Self {
        let counters = policies
            .record_stats
            .then(|| Arc::new(StatsCounter::default()));

        let mut builder = Cache::builder().max_capacity(policies.max_capacity.max(1));
        if let Some(ttl) = policies.expire_after_write {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = policies.expire_after_access {
            builder = builder.time_to_idle(tti);
        }
        if let Some(counters) = counters.clone() {
            builder = builder.eviction_listener(
                move |key: Arc<String>, _value: Arc<CachedValue>, cause: RemovalCause| {
                    if cause.was_evicted() {
                        debug!(key = %key, ?cause, "Managed cache entry evicted");
                        counters.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                },
            );
        }

        info!(
            max_capacity = policies.max_capacity,
            expire_after_write = ?policies.expire_after_write,
            expire_after_access = ?policies.expire_after_access,
            refresh_after_write = ?policies.refresh_after_write,
            record_stats = policies.record_stats,
            "Managed cache configured"
        );

        Self {
            inner: builder.build(),
            repository,
            policies,
            counters,
            refreshing: Arc::new(DashMap::new()),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn policies(&self) -> &CachePolicies {
        &self.policies
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Read `key` through the repository.
    ///
    /// A reload installs its snapshot before invalidating, so if the epoch
    /// moved while this load ran, the repository's current snapshot is at
    /// least as new as anything this load read.
    async fn load(&self, key: &str) -> Option<Arc<CachedValue>> {
        let started = Instant::now();
        let epoch = self.epoch();
        let mut found = self.repository.find(key).await;
        if self.epoch() != epoch {
            debug!(key = %key, "Cache invalidated during load, re-reading current snapshot");
            found = self.repository.current().await.get(key).map(str::to_string);
        }
        if let Some(counters) = &self.counters {
            counters.record_load(found.is_some(), started.elapsed());
        }
        found.map(CachedValue::new)
    }

    fn needs_refresh(&self, cached: &CachedValue) -> bool {
        self.policies
            .refresh_after_write
            .is_some_and(|after| cached.written_at.elapsed() >= after)
    }

    /// Reload `key` in the background unless a reload is already running.
    fn spawn_refresh(&self, key: &str, stale: Arc<CachedValue>) {
        if self.refreshing.insert(key.to_string(), ()).is_some() {
            return;
        }
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let epoch = this.epoch();
            let fresh = this.load(&key).await;
            this.commit_refresh(&key, &stale, epoch, fresh).await;
            this.refreshing.remove(&key);
        });
    }

    /// Apply a refresh result, but only if the entry it started from is still
    /// the one cached and nothing was invalidated in the meantime.
    async fn commit_refresh(
        &self,
        key: &str,
        stale: &Arc<CachedValue>,
        epoch: u64,
        fresh: Option<Arc<CachedValue>>,
    ) {
        let this_epoch = self.epoch();
        let _ = self
            .inner
            .entry_by_ref(key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if this_epoch == epoch && Arc::ptr_eq(entry.value(), stale) => {
                        match fresh {
                            Some(fresh) => Op::Put(fresh),
                            None => {
                                debug!(key = %key, "Key vanished from data file during refresh");
                                Op::Remove
                            }
                        }
                    }
                    _ => {
                        debug!(key = %key, "Entry changed during refresh, dropping result");
                        Op::Nop
                    }
                };
                std::future::ready(op)
            })
            .await;
    }
}

#[async_trait]
impl ValueCache for ManagedCache {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn get(&self, key: &str) -> Option<String> {
        let entry = self
            .inner
            .entry_by_ref(key)
            .or_optionally_insert_with(self.load(key))
            .await;

        let Some(entry) = entry else {
            if let Some(counters) = &self.counters {
                counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            return None;
        };

        if let Some(counters) = &self.counters {
            if entry.is_fresh() {
                counters.misses.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.hits.fetch_add(1, Ordering::Relaxed);
            }
        }

        let cached = entry.into_value();
        if self.needs_refresh(&cached) {
            self.spawn_refresh(key, cached.clone());
        }
        Some(cached.value.clone())
    }

    async fn invalidate(&self, key: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate(key).await;
    }

    async fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }

    async fn stats(&self) -> CacheStats {
        // Flush pending maintenance so entry_count and evictions are current.
        self.inner.run_pending_tasks().await;
        let entries = self.inner.entry_count();
        match &self.counters {
            Some(counters) => counters.snapshot(entries),
            None => CacheStats {
                entries,
                ..Default::default()
            },
        }
    }
}
