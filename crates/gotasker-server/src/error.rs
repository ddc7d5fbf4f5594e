//! Error types for the GoTasker server.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::migrate::MigrateError;

/// Application error type returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Fatal errors raised while bringing the service up.
///
/// Every variant aborts startup; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open database: {0}")]
    ConnectionOpen(#[source] sqlx::Error),

    #[error("failed to ping database: {0}")]
    ConnectionLiveness(#[source] sqlx::Error),

    #[error("database did not respond within {}s", .0.as_secs())]
    LivenessTimeout(Duration),

    #[error("failed to run migrations: {0}")]
    Migration(#[from] MigrateError),
}
