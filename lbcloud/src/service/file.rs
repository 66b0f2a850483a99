use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::storage::account_index::UploadStatus;
use crate::utils::state::AppState;

#[derive(Deserialize, Debug, Clone)]
pub struct UploadReq {
    token: String,
    location: String,
    name: String,
    data: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DownloadReq {
    token: String,
    location: String,
    name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ListReq {
    token: String,
    location: String,
}

#[derive(Serialize, Debug)]
pub struct UploadRes {
    pub result: UploadStatus,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DownloadRes {
    pub data: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListRes {
    pub list: Vec<String>,
}

/// POST /v1/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UploadReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    tracing::debug!("Upload {}/{} ({} bytes)", req.location, req.name, req.data.len());
    let result = state
        .coordinator
        .upload(&req.token, &req.location, &req.name, &req.data)
        .await?;
    Ok(Json(UploadRes { result }))
}

/// POST /v1/download
pub async fn download(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let data = state
        .coordinator
        .download(&req.token, &req.location, &req.name)
        .await?;
    Ok(Json(DownloadRes { data }))
}

/// POST /v1/list
pub async fn list(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ListReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let list = state.coordinator.list(&req.token, &req.location).await?;
    tracing::debug!("Listed {} entries in {}", list.len(), req.location);
    Ok(Json(ListRes { list }))
}
