use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{config::CacheBackend, state::AppState};

/// `GET /health`: liveness check.
///
/// `200 OK` while DuckDB answers, `503` otherwise. The dedup cache is not
/// probed: counting fails open, so an unreachable cache never makes the
/// service unhealthy.
///
/// ```json
/// { "status": "ok", "version": "0.1.0", "dedup_cache": "memory" }
/// ```
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dedup_cache = match state.config.cache_backend {
        CacheBackend::Memory => "memory",
        CacheBackend::Redis(_) => "redis",
    };

    let (status, label) = match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Health check: DuckDB unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        status,
        Json(json!({
            "status": label,
            "version": env!("CARGO_PKG_VERSION"),
            "dedup_cache": dedup_cache,
        })),
    )
}
