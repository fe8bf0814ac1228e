//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::server::AppState;

/// GET /api/health. `degraded` until the data file has been parsed once.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.repository.current().await;
    let status = if snapshot.loaded_at.is_some() {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "keys": snapshot.len(),
    }))
}
