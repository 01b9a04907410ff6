use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{not_found, ErrorResponse};
use crate::api::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct StationSummary {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StationListResponse {
    pub stations: Vec<StationSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopLookupResponse {
    pub stop_id: String,
    pub name: String,
}

/// All known parent stations
#[utoipa::path(
    get,
    path = "/api/stations-list",
    responses(
        (status = 200, description = "Parent stations from the static tables", body = StationListResponse)
    ),
    tag = "stations"
)]
pub async fn list_stations(State(state): State<AppState>) -> Json<StationListResponse> {
    let index = state.board.index();
    let mut stations: Vec<StationSummary> = index
        .parent_station_ids()
        .map(|id| StationSummary {
            id: id.to_string(),
            name: index.stop_name(id).map(str::to_string),
        })
        .collect();
    stations.sort_by(|a, b| a.id.cmp(&b.id));
    Json(StationListResponse { stations })
}

/// Resolve a stop id to its display name
#[utoipa::path(
    get,
    path = "/api/lookup/{stop_id}",
    params(
        ("stop_id" = String, Path, description = "Physical stop id")
    ),
    responses(
        (status = 200, description = "Stop name", body = StopLookupResponse),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stations"
)]
pub async fn lookup_stop(
    State(state): State<AppState>,
    Path(stop_id): Path<String>,
) -> Result<Json<StopLookupResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.board.index().stop_name(&stop_id) {
        Some(name) => Ok(Json(StopLookupResponse {
            stop_id,
            name: name.to_string(),
        })),
        None => Err(not_found("Not found")),
    }
}
