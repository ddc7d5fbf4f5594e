//! API routes for the GoTasker server.

pub mod health;
pub mod tasks;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::store::TaskStore;

/// Creates the main router with all routes mounted.
pub fn create_router(store: Arc<dyn TaskStore>) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1", api_v1_routes(store))
        .layer(TraceLayer::new_for_http())
}

/// Creates the v1 API routes.
fn api_v1_routes(store: Arc<dyn TaskStore>) -> Router {
    Router::new().nest("/tasks", tasks::router(store))
}
