//! Output types of the reconciliation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which stop-time event produced the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Arrival,
    Departure,
    Unknown,
}

/// One reconciled upcoming stop event, built fresh per request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartureRecord {
    pub trip_id: String,
    pub route_id: String,
    /// Display name from routes.txt, falling back to the raw route id.
    pub route_name: Option<String>,
    pub headsign: Option<String>,
    pub stop_id: String,
    pub stop_name: Option<String>,
    /// Scheduled time of day (HH:MM:SS, hours may exceed 24), or null when
    /// no schedule match was possible.
    pub scheduled: Option<String>,
    /// Predicted instant as RFC 3339, from the real-time feed.
    pub predicted: Option<String>,
    /// Predicted time of day in the station timezone.
    pub predicted_local: Option<String>,
    /// Predicted instant as epoch milliseconds.
    pub predicted_ts: Option<i64>,
    pub event_type: EventType,
    pub status: String,
    pub delay_seconds: Option<i32>,
}

/// A windowed, sorted page of departures for one station.
#[derive(Debug, Clone)]
pub struct BoardPage {
    pub station_id: String,
    /// Total matching records before truncation to the requested count.
    pub total: usize,
    pub results: Vec<DepartureRecord>,
    pub fetched_at: DateTime<Utc>,
}
