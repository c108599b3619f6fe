use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// `TraceLayer` gives structured request/response logging via `tracing`.
/// The detail page answers with and without the trailing slash; the path as
/// requested is what visit deduplication keys on.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/post/{post_id}", get(routes::posts::post_detail))
        .route("/post/{post_id}/", get(routes::posts::post_detail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
