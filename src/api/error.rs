// src/api/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::error::{StoreError, ValidationError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    /// Covers both absent records and records owned by someone else.
    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    #[error("Corrupt session")]
    CorruptSession,

    #[error("Deserialising session failed: {0}")]
    InvalidSessionState(#[from] tower_sessions::session::Error),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("thread: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::Invalid(validation) => ApiError::Validation(validation),
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::InvalidBody(_) | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::DuplicateUsername(_)) => StatusCode::CONFLICT,
            ApiError::CorruptSession
            | ApiError::InvalidSessionState(_)
            | ApiError::Store(_)
            | ApiError::JoinError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            ApiError::Validation(validation) => serde_json::json!({
                "result": "failed",
                "error": "validation failed",
                "fields": validation.fields,
            }),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                log::error!("Internal Server Error: {}", self);
                serde_json::json!({
                    "result": "failed",
                    "error": "internal server error",
                })
            }
            _ => {
                log::debug!("Request failed with {}: {}", status, self);
                serde_json::json!({
                    "result": "failed",
                    "error": self.to_string(),
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
