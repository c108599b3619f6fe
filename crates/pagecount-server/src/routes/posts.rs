use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{error::AppError, identity::resolve_identity, state::AppState};

/// `GET /post/{post_id}/`: post detail page.
///
/// The body carries the counters as they were before this view. Once the
/// body is built the view is handed to the visit counter, keyed on the
/// request path and today's UTC date. Counting problems are logged by the
/// counter and never change the response.
///
/// Every response, including 404s, carries the visitor's `uid` cookie.
#[tracing::instrument(skip(state, headers, uri))]
pub async fn post_detail(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let identity = resolve_identity(&headers, state.config.https);

    let response = match render_post(&state, &post_id).await {
        Ok((id, body)) => {
            state
                .counter
                .record_visit(id, identity.token(), uri.path(), Utc::now().date_naive())
                .await;
            body.into_response()
        }
        Err(e) => e.into_response(),
    };

    identity.attach(response)
}

async fn render_post(
    state: &AppState,
    raw_id: &str,
) -> Result<(i64, Json<serde_json::Value>), AppError> {
    // Non-numeric ids cannot name a post; answer like an unknown id.
    let id: i64 = raw_id
        .parse()
        .map_err(|_| AppError::NotFound("Post not found".to_string()))?;

    let post = state
        .db
        .get_post(id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    Ok((post.id, Json(json!({ "data": post }))))
}
