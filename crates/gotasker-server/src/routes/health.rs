//! Liveness and landing endpoints.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// Response for the health check.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
}

/// Response for the landing page.
#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
    pub docs: &'static str,
}

/// Creates the health router.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(welcome))
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "GoTasker API is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /
async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to GoTasker API! Visit /health for health check",
        docs: "API documentation will be available at /docs (coming soon)",
    })
}
