//! File-backed key/value repository.
//!
//! The data file is a single JSON object mapping string keys to string
//! values. Every [`FileRepository::load`] re-reads the file. A successful
//! parse replaces the current [`Snapshot`] wholesale; a failed one is logged
//! and the previous snapshot is served instead, flagged `success = false`.
//!
//! # Example
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use snapcache::repository::FileRepository;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("values.json");
//! std::fs::write(&path, r#"{"greeting": "hello"}"#).unwrap();
//!
//! let repo = FileRepository::new(&path);
//! assert_eq!(repo.find("greeting").await.as_deref(), Some("hello"));
//! assert_eq!(repo.find("missing").await, None);
//! # });
//! ```

pub mod watcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub use watcher::{DataFileWatcher, FileChanged};

/// Errors raised while reading the data file.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("failed to read data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse data file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Parsed contents of the data file at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Whether the read that produced this view succeeded.
    pub success: bool,
    /// Key/value mapping.
    pub values: HashMap<String, String>,
    /// When `values` was parsed. `None` until the first successful read.
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            success: false,
            values: HashMap::new(),
            loaded_at: None,
        }
    }

    fn stale(&self) -> Self {
        Self {
            success: false,
            ..self.clone()
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// The installed snapshot and the generation of the load that produced it.
#[derive(Debug)]
struct Current {
    generation: u64,
    snapshot: Arc<Snapshot>,
}

/// Repository over a single JSON file.
///
/// Clone is cheap: all clones share the current snapshot.
///
/// Every load is stamped with a generation when it starts. A load that
/// finishes after a later-started one has been installed is discarded, so
/// overlapping loads can never roll the snapshot back to older file contents.
#[derive(Clone)]
pub struct FileRepository {
    path: PathBuf,
    current: Arc<RwLock<Current>>,
    generations: Arc<AtomicU64>,
}

impl FileRepository {
    /// Create a repository for `path`. No I/O happens until the first load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(RwLock::new(Current {
                generation: 0,
                snapshot: Arc::new(Snapshot::empty()),
            })),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the data file without touching the current snapshot.
    pub async fn try_read(&self) -> Result<Snapshot, RepositoryError> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RepositoryError::Io {
                path: self.path.clone(),
                source,
            })?;
        let values: HashMap<String, String> =
            serde_json::from_str(&data).map_err(|source| RepositoryError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(Snapshot {
            success: true,
            values,
            loaded_at: Some(Utc::now()),
        })
    }

    /// Re-read the data file.
    ///
    /// On success the new snapshot becomes current and is returned. On
    /// failure the error is logged and the previous snapshot is returned
    /// with `success = false`; its values are left in place.
    ///
    /// If a load that started later has already been installed, this one's
    /// result is dropped and the newer snapshot is returned instead.
    pub async fn load(&self) -> Arc<Snapshot> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        match self.try_read().await {
            Ok(snapshot) => {
                debug!(
                    path = %self.path.display(),
                    keys = snapshot.len(),
                    generation,
                    "Data file loaded"
                );
                self.install(generation, snapshot).await
            }
            Err(e) => {
                let previous = self.current().await;
                warn!(
                    error = %e,
                    stale_keys = previous.len(),
                    "Data file load failed; serving last good snapshot"
                );
                Arc::new(previous.stale())
            }
        }
    }

    async fn install(&self, generation: u64, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut current = self.current.write().await;
        if generation < current.generation {
            debug!(
                generation,
                installed = current.generation,
                "Discarding load overtaken by a newer one"
            );
            return current.snapshot.clone();
        }
        current.generation = generation;
        current.snapshot = Arc::new(snapshot);
        current.snapshot.clone()
    }

    /// Load the file and look up `key`.
    pub async fn find(&self, key: &str) -> Option<String> {
        self.load().await.get(key).map(str::to_string)
    }

    /// The current snapshot, without reading the file.
    pub async fn current(&self) -> Arc<Snapshot> {
        self.current.read().await.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_with(contents: &str) -> (TempDir, FileRepository) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("values.json");
        std::fs::write(&path, contents).unwrap();
        let repo = FileRepository::new(path);
        (tmp, repo)
    }

    #[tokio::test]
    async fn test_new_repository_starts_empty() {
        let repo = FileRepository::new("/nonexistent/values.json");
        let snap = repo.current().await;
        assert!(!snap.success);
        assert!(snap.is_empty());
        assert!(snap.loaded_at.is_none());
    }

    #[tokio::test]
    async fn test_load_success_replaces_snapshot() {
        let (_tmp, repo) = repo_with(r#"{"a": "1", "b": "2"}"#);
        let snap = repo.load().await;
        assert!(snap.success);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("a"), Some("1"));
        assert!(snap.loaded_at.is_some());
        assert_eq!(repo.current().await.len(), 2);
    }

    #[tokio::test]
    async fn test_find_hit_and_miss() {
        let (_tmp, repo) = repo_with(r#"{"a": "1"}"#);
        assert_eq!(repo.find("a").await.as_deref(), Some("1"));
        assert_eq!(repo.find("z").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_serves_stale_values() {
        let (_tmp, repo) = repo_with(r#"{"a": "1"}"#);
        assert!(repo.load().await.success);

        std::fs::write(repo.path(), "{ broken").unwrap();
        let snap = repo.load().await;
        assert!(!snap.success);
        assert_eq!(snap.get("a"), Some("1"));
        assert_eq!(repo.find("a").await.as_deref(), Some("1"));
        // Stored snapshot keeps its success flag and values.
        assert!(repo.current().await.success);
    }

    #[tokio::test]
    async fn test_missing_file_serves_stale_values() {
        let (_tmp, repo) = repo_with(r#"{"a": "1"}"#);
        repo.load().await;
        std::fs::remove_file(repo.path()).unwrap();
        let snap = repo.load().await;
        assert!(!snap.success);
        assert_eq!(snap.get("a"), Some("1"));
    }

    #[tokio::test]
    async fn test_failure_before_any_success_is_empty() {
        let (_tmp, repo) = repo_with("[]");
        let snap = repo.load().await;
        assert!(!snap.success);
        assert!(snap.is_empty());
    }

    #[tokio::test]
    async fn test_non_string_values_rejected() {
        let (_tmp, repo) = repo_with(r#"{"a": 1}"#);
        let err = repo.try_read().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_try_read_does_not_replace_current() {
        let (_tmp, repo) = repo_with(r#"{"a": "1"}"#);
        let snap = repo.try_read().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert!(repo.current().await.is_empty());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_values() {
        let (_tmp, repo) = repo_with(r#"{"a": "1"}"#);
        repo.load().await;
        std::fs::write(repo.path(), r#"{"b": "2"}"#).unwrap();
        let snap = repo.load().await;
        assert_eq!(snap.get("a"), None);
        assert_eq!(snap.get("b"), Some("2"));
    }

    fn snapshot_of(pairs: &[(&str, &str)]) -> Snapshot {
        Snapshot {
            success: true,
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            loaded_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_older_load_does_not_replace_newer() {
        let repo = FileRepository::new("/nonexistent/values.json");
        let newer = repo.install(2, snapshot_of(&[("a", "2")])).await;
        assert_eq!(newer.get("a"), Some("2"));

        let returned = repo.install(1, snapshot_of(&[("a", "1")])).await;
        assert_eq!(returned.get("a"), Some("2"));
        assert_eq!(repo.current().await.get("a"), Some("2"));

        repo.install(3, snapshot_of(&[("a", "3")])).await;
        assert_eq!(repo.current().await.get("a"), Some("3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_load_overlapping_reload_keeps_new_contents() {
        let big: HashMap<String, String> = (0..200_000)
            .map(|i| (format!("k{i}"), format!("v{i}")))
            .chain(std::iter::once(("a".to_string(), "1".to_string())))
            .collect();
        let (_tmp, repo) = repo_with(&serde_json::to_string(&big).unwrap());

        let slow = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.load().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        std::fs::write(repo.path(), r#"{"a": "2"}"#).unwrap();
        let fresh = repo.load().await;
        assert_eq!(fresh.get("a"), Some("2"));

        let _ = slow.await.unwrap();
        assert_eq!(repo.current().await.get("a"), Some("2"));
        assert_eq!(repo.find("a").await.as_deref(), Some("2"));
    }

    #[test]
    fn test_snapshot_keys_sorted() {
        let snap = Snapshot {
            success: true,
            values: [("b", "2"), ("a", "1"), ("c", "3")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            loaded_at: None,
        };
        assert_eq!(snap.keys(), vec!["a", "b", "c"]);
    }
}
