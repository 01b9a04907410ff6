use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of rows loaded from stops.txt
    pub stops: usize,
    /// Number of rows loaded from stop_times.txt
    pub stop_times: usize,
    /// Number of rows loaded from routes.txt
    pub routes: usize,
    /// When the real-time feed was last fetched successfully, if ever
    pub feed_fetched_at: Option<DateTime<Utc>>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let counts = state.board.index().counts();
    Json(HealthResponse {
        healthy: true,
        stops: counts.stops,
        stop_times: counts.stop_times,
        routes: counts.routes,
        feed_fetched_at: state.board.last_fetched().await,
    })
}
