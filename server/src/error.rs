//! Unified error handling for the server.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cartsync_engine::ErrorBody;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid mutation {id}: {source}")]
    InvalidMutation {
        id: String,
        #[source]
        source: cartsync_engine::Error,
    },

    #[error("Batch of {size} mutations exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::InvalidMutation { id, source } => {
                tracing::warn!(mutation_id = %id, error = %source, "Rejected batch");
                (
                    StatusCode::BAD_REQUEST,
                    source.to_string(),
                    Some(format!("mutation {id}")),
                )
            }
            AppError::BatchTooLarge { .. } => (StatusCode::BAD_REQUEST, self.to_string(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
        };

        let body = Json(ErrorBody {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
