use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::utils::state::AppState;

#[derive(Deserialize, Debug, Clone)]
pub struct TokenReq {
    token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterRes {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct IdentifyRes {
    pub user: String,
}

/// POST /v1/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let token = state.coordinator.register(&req.token).await?;
    Ok(Json(RegisterRes { token }))
}

/// POST /v1/identify
pub async fn identify(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let user = state.coordinator.identify(&req.token).await?;
    Ok(Json(IdentifyRes { user }))
}
