use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use crate::service::file::{download, list, upload};
use crate::service::user::{identify, register};
use crate::utils::state::AppState;

pub fn create_v1_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/identify", post(identify))
        .route("/upload", post(upload))
        .route("/download", post(download))
        .route("/list", post(list))
}
