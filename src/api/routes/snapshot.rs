//! Snapshot inspection and reload routes.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::server::AppState;
use crate::repository::Snapshot;

fn summary(snapshot: &Snapshot) -> Value {
    json!({
        "success": snapshot.success,
        "loaded_at": snapshot.loaded_at,
        "keys": snapshot.keys(),
    })
}

/// GET /api/snapshot: the current snapshot, without touching the file.
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.repository.current().await;
    Json(summary(&snapshot))
}

/// POST /api/snapshot/reload: re-read the file and invalidate both caches.
pub async fn reload_snapshot(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.reload().await;
    Json(summary(&snapshot))
}
