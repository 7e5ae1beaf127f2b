// GET handlers: version, dashboard document and individual usage views

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::TimeDelta;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::aggregation::{flatten, group_by_user_and_gpu, latest_instant, trend_over_time, window};
use crate::dashboard;
use crate::models::local_now;

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/dashboard: every view in one document.
pub(super) async fn dashboard_handler(State(state): State<AppState>) -> impl IntoResponse {
    let series = state.store.load().await;
    Json(dashboard::build(&series, local_now()))
}

/// GET /api/usage/current: per-user/per-GPU usage at the latest collection instant.
pub(super) async fn current_usage_handler(State(state): State<AppState>) -> impl IntoResponse {
    let series = state.store.load().await;
    let rows = flatten(&series);
    Json(group_by_user_and_gpu(&latest_instant(&rows)))
}

#[derive(Debug, Deserialize)]
pub(super) struct WindowParams {
    hours: Option<u32>,
}

/// GET /api/usage/window?hours=N: usage rolled up over the last N hours (default 1).
pub(super) async fn window_usage_handler(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<impl IntoResponse, ApiError> {
    let hours = params.hours.unwrap_or(1);
    if hours == 0 {
        return Err(ApiError::BadRequest("hours must be > 0".into()));
    }
    let duration = TimeDelta::try_hours(hours.into())
        .ok_or_else(|| ApiError::BadRequest(format!("hours out of range: {hours}")))?;
    let series = state.store.load().await;
    let rows = flatten(&series);
    let windowed = window(&rows, local_now(), duration);
    Ok(Json(group_by_user_and_gpu(&windowed)))
}

/// GET /api/trend: GPU and inactive counts per user per collection instant.
pub(super) async fn trend_handler(State(state): State<AppState>) -> impl IntoResponse {
    let series = state.store.load().await;
    Json(trend_over_time(&flatten(&series)))
}

/// GET /api/snapshots: the raw retained series, in store format.
pub(super) async fn snapshots_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.load().await)
}
