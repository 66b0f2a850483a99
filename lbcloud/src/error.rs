use std::io;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Recoverable, answered as structured bodies
    #[error("no account for the given token")]
    UserNotFound,

    #[error("file {location}/{name} not found")]
    FileNotFound { location: String, name: String },

    #[error("an account for this token is already registered")]
    UserExists,

    #[error("account limit of {0} reached")]
    CapacityReached(usize),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("timed out waiting for the lock of account {0}")]
    LockTimeout(String),

    // Internal Errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Others(String),
}

impl AppError {
    /// Wire code placed in the `error` field of the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_404",
            Self::FileNotFound { .. } => "FILE_404",
            Self::UserExists => "USER_EXISTS",
            Self::CapacityReached(_) => "USER_LIMIT",
            Self::InvalidName(_) => "INVALID_NAME",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::LockTimeout(_) => "BUSY",
            Self::Io(_) | Self::Json(_) | Self::Others(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // existing clients read the body, not the status
            Self::UserNotFound | Self::FileNotFound { .. } | Self::UserExists => StatusCode::OK,
            Self::CapacityReached(_) | Self::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidName(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) | Self::Json(_) | Self::Others(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Generating response for AppError: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.code() }))).into_response()
    }
}
