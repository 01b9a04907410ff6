use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{bad_gateway, ErrorResponse};
use crate::api::AppState;
use crate::gtfs::DepartureRecord;

#[derive(Debug, Deserialize, IntoParams)]
pub struct StationQuery {
    /// Maximum number of results to return
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationBoardResponse {
    pub station_id: String,
    /// Total matching departures before truncation
    pub count: usize,
    pub results: Vec<DepartureRecord>,
    pub fetched_at: DateTime<Utc>,
}

/// Live departure board for a station
#[utoipa::path(
    get,
    path = "/api/station/{station_id}",
    params(
        ("station_id" = String, Path, description = "Parent station or stop id"),
        StationQuery
    ),
    responses(
        (status = 200, description = "Sorted upcoming departures", body = StationBoardResponse),
        (status = 502, description = "Real-time feed unavailable", body = ErrorResponse)
    ),
    tag = "board"
)]
pub async fn get_station_board(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    Query(query): Query<StationQuery>,
) -> Result<Json<StationBoardResponse>, (StatusCode, Json<ErrorResponse>)> {
    let page = state
        .board
        .departures(&station_id, query.count)
        .await
        .map_err(|e| {
            warn!(station = %station_id, error = %e, "Feed fetch failed");
            bad_gateway(format!("Real-time feed unavailable: {}", e))
        })?;

    Ok(Json(StationBoardResponse {
        station_id: page.station_id,
        count: page.total,
        results: page.results,
        fetched_at: page.fetched_at,
    }))
}
