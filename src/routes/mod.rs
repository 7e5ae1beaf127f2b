// HTTP routes for the dashboard layer. Every request re-reads the store; nothing is cached.

mod error;
mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::store::SnapshotStore;

pub use error::ApiError;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<SnapshotStore>,
}

pub fn app(store: Arc<SnapshotStore>) -> Router {
    let state = AppState { store };
    Router::new()
        .route("/", get(|| async { "gpuwatch: cluster GPU usage monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/dashboard", get(http::dashboard_handler)) // GET /api/dashboard
        .route("/api/usage/current", get(http::current_usage_handler)) // GET /api/usage/current
        .route("/api/usage/window", get(http::window_usage_handler)) // GET /api/usage/window?hours=N
        .route("/api/trend", get(http::trend_handler)) // GET /api/trend
        .route("/api/snapshots", get(http::snapshots_handler)) // GET /api/snapshots
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
