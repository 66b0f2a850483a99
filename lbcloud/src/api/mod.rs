pub mod v1;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::utils::state::AppState;

/// Room for the JSON envelope around a payload of the full quota.
const BODY_OVERHEAD_BYTES: usize = 1 << 20;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.quota_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_OVERHEAD_BYTES);

    Router::new()
        .nest("/v1", v1::create_v1_router())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Endpoint not found." })))
}
