use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{bad_gateway, ErrorResponse};
use crate::api::AppState;
use crate::gtfs::snapshot::{write_snapshot, StationSnapshot};

#[derive(Debug, Deserialize, IntoParams)]
pub struct RefreshQuery {
    /// Comma-separated station ids to snapshot; defaults to the configured list
    pub stations: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub refreshed_at: DateTime<Utc>,
    /// Stations whose boards were written to the snapshot directory
    pub snapshots_written: Vec<String>,
}

/// Force a feed refresh, bypassing the TTL
#[utoipa::path(
    get,
    path = "/api/refresh",
    params(RefreshQuery),
    responses(
        (status = 200, description = "Feed refreshed", body = RefreshResponse),
        (status = 502, description = "Real-time feed unavailable", body = ErrorResponse)
    ),
    tag = "board"
)]
pub async fn refresh_feed(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<RefreshResponse>, (StatusCode, Json<ErrorResponse>)> {
    let refreshed_at = state.board.refresh().await.map_err(|e| {
        warn!(error = %e, "Manual refresh failed");
        bad_gateway(format!("Real-time feed unavailable: {}", e))
    })?;

    let stations: Vec<String> = match &query.stations {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => state.board.snapshot_stations().to_vec(),
    };

    let mut snapshots_written = Vec::new();
    if let Some(dir) = state.board.snapshot_dir() {
        for station_id in &stations {
            // The feed was just refreshed; this reads the cache.
            match state.board.departures(station_id, None).await {
                Ok(page) => {
                    let snapshot = StationSnapshot::from_page(&page);
                    match write_snapshot(dir, &snapshot).await {
                        Ok(_) => snapshots_written.push(station_id.clone()),
                        Err(e) => {
                            warn!(station = %station_id, error = %e, "Snapshot write failed")
                        }
                    }
                }
                Err(e) => warn!(station = %station_id, error = %e, "Snapshot board failed"),
            }
        }
    }

    Ok(Json(RefreshResponse {
        refreshed_at,
        snapshots_written,
    }))
}
