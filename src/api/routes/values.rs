//! Value lookup, invalidation and stats routes, shared by both caches.
//!
//! The router nests these under `/api/managed` and `/api/annotated`, each
//! bound to its own [`ValueCache`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::cache::ValueCache;

/// GET /values/{key}
pub async fn get_value(
    State(cache): State<Arc<dyn ValueCache>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    match cache.get(&key).await {
        Some(value) => (
            StatusCode::OK,
            Json(json!({ "key": key, "value": value, "cache": cache.name() })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Key '{key}' not found") })),
        ),
    }
}

/// DELETE /values/{key}
pub async fn evict_value(
    State(cache): State<Arc<dyn ValueCache>>,
    Path(key): Path<String>,
) -> StatusCode {
    cache.invalidate(&key).await;
    StatusCode::NO_CONTENT
}

/// DELETE /values
pub async fn clear_values(State(cache): State<Arc<dyn ValueCache>>) -> StatusCode {
    cache.invalidate_all().await;
    StatusCode::NO_CONTENT
}

/// GET /stats
pub async fn get_stats(State(cache): State<Arc<dyn ValueCache>>) -> Json<Value> {
    let stats = cache.stats().await;
    Json(json!({
        "cache": cache.name(),
        "hits": stats.hits,
        "misses": stats.misses,
        "requests": stats.requests(),
        "hit_rate": stats.hit_rate(),
        "miss_rate": stats.miss_rate(),
        "load_successes": stats.load_successes,
        "load_failures": stats.load_failures,
        "total_load_time_ns": stats.total_load_time_ns,
        "average_load_penalty_ms": stats.average_load_penalty_ms(),
        "evictions": stats.evictions,
        "entries": stats.entries,
    }))
}
