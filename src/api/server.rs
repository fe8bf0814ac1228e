//! Axum API server.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::config::ServerConfig;
use crate::cache::{AnnotatedCache, ManagedCache, ValueCache};
use crate::config::{Config, RepositoryConfig};
use crate::repository::{DataFileWatcher, FileChanged, FileRepository, Snapshot};

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backing data file.
    pub repository: FileRepository,
    /// Explicitly configured cache with policies and statistics.
    pub managed: ManagedCache,
    /// Memoizing cache with no policies.
    pub annotated: AnnotatedCache,
}

impl AppState {
    pub fn new(repository: FileRepository, managed: ManagedCache, annotated: AnnotatedCache) -> Self {
        Self {
            repository,
            managed,
            annotated,
        }
    }

    /// Wire a repository and both caches from configuration.
    pub fn from_config(config: &Config) -> Self {
        let repository = FileRepository::new(config.repository.path.clone());
        let managed = ManagedCache::new(repository.clone(), &config.managed_cache);
        let annotated = AnnotatedCache::new(repository.clone());
        Self::new(repository, managed, annotated)
    }

    /// Re-read the data file and drop everything both caches hold.
    pub async fn reload(&self) -> Arc<Snapshot> {
        let snapshot = self.repository.load().await;
        self.managed.invalidate_all().await;
        self.annotated.invalidate_all().await;
        info!(
            success = snapshot.success,
            keys = snapshot.len(),
            "Data reloaded, caches invalidated"
        );
        snapshot
    }
}

/// Routes shared by both cache strategies, bound to one of them.
fn cache_routes(cache: Arc<dyn ValueCache>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(super::routes::values::get_stats))
        .route("/values", delete(super::routes::values::clear_values))
        .route(
            "/values/{key}",
            get(super::routes::values::get_value).delete(super::routes::values::evict_value),
        )
        .with_state(cache)
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let managed: Arc<dyn ValueCache> = Arc::new(state.managed.clone());
    let annotated: Arc<dyn ValueCache> = Arc::new(state.annotated.clone());
    let shared_state = Arc::new(state);

    Router::new()
        .route("/api/health", get(super::routes::health::get_health))
        // Snapshot
        .route("/api/snapshot", get(super::routes::snapshot::get_snapshot))
        .route(
            "/api/snapshot/reload",
            post(super::routes::snapshot::reload_snapshot),
        )
        // Caches
        .nest("/api/managed", cache_routes(managed))
        .nest("/api/annotated", cache_routes(annotated))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Spawn the data file watcher and the task that reloads on each change.
fn spawn_reloader(state: AppState, config: &RepositoryConfig, shutdown_rx: watch::Receiver<bool>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<FileChanged>();
    let watcher = DataFileWatcher::new(
        config.path.clone(),
        Duration::from_millis(config.poll_interval_ms.max(1)),
    );
    tokio::spawn(watcher.watch(tx, shutdown_rx));
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(path = %event.path.display(), "Data file changed, reloading");
            state.reload().await;
        }
    });
}

/// Start the API server and run until Ctrl-C.
pub async fn start_server(
    config: &Config,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Warm the snapshot so `/api/snapshot` is meaningful from the start.
    let snapshot = state.repository.load().await;
    if !snapshot.success {
        warn!(
            path = %state.repository.path().display(),
            "Initial data file load failed; serving empty snapshot until it succeeds"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if config.repository.watch {
        spawn_reloader(state.clone(), &config.repository, shutdown_rx);
    }

    let app = build_router(state, &config.server);
    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    fn make_state(contents: &str) -> (TempDir, AppState) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.repository.path = tmp.path().join("values.json");
        std::fs::write(&config.repository.path, contents).unwrap();
        (tmp, AppState::from_config(&config))
    }

    #[test]
    fn test_build_router() {
        let (_tmp, state) = make_state("{}");
        let _router = build_router(state, &ServerConfig::default());
    }

    #[tokio::test]
    async fn test_reload_invalidates_both_caches() {
        let (tmp, state) = make_state(r#"{"a": "1"}"#);
        assert_eq!(state.managed.get("a").await.as_deref(), Some("1"));
        assert_eq!(state.annotated.get("a").await.as_deref(), Some("1"));

        std::fs::write(tmp.path().join("values.json"), r#"{"a": "2"}"#).unwrap();
        let snapshot = state.reload().await;
        assert!(snapshot.success);
        assert_eq!(state.managed.get("a").await.as_deref(), Some("2"));
        assert_eq!(state.annotated.get("a").await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_unknown_route_404() {
        let (_tmp, state) = make_state("{}");
        let app = build_router(state, &ServerConfig::default());
        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reloader_picks_up_file_change() {
        let (tmp, state) = make_state(r#"{"a": "1"}"#);
        let repo_cfg = RepositoryConfig {
            path: tmp.path().join("values.json"),
            watch: true,
            poll_interval_ms: 25,
        };
        assert_eq!(state.annotated.get("a").await.as_deref(), Some("1"));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_reloader(state.clone(), &repo_cfg, shutdown_rx);
        // Some filesystems have coarse mtime resolution.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        std::fs::write(&repo_cfg.path, r#"{"a": "2"}"#).unwrap();

        let mut seen = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            seen = state.annotated.get("a").await;
            if seen.as_deref() == Some("2") {
                break;
            }
        }
        assert_eq!(seen.as_deref(), Some("2"));
        let _ = shutdown_tx.send(true);
    }
}
