//! Station board snapshots persisted to disk on manual refresh.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::error::BoardError;
use super::types::{BoardPage, DepartureRecord, EventType};

/// One departure as persisted, a trimmed view of [`DepartureRecord`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub trip_id: String,
    pub route_id: String,
    pub route_name: Option<String>,
    pub stop_id: String,
    pub scheduled: Option<String>,
    pub predicted: Option<String>,
    /// Predicted instant as epoch seconds.
    pub predicted_seconds: Option<i64>,
    pub event_type: EventType,
    pub status: String,
}

impl From<&DepartureRecord> for SnapshotEntry {
    fn from(record: &DepartureRecord) -> Self {
        Self {
            trip_id: record.trip_id.clone(),
            route_id: record.route_id.clone(),
            route_name: record.route_name.clone(),
            stop_id: record.stop_id.clone(),
            scheduled: record.scheduled.clone(),
            predicted: record.predicted.clone(),
            predicted_seconds: record.predicted_ts.map(|ms| ms / 1000),
            event_type: record.event_type,
            status: record.status.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub station_id: String,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub results: Vec<SnapshotEntry>,
}

impl StationSnapshot {
    pub fn from_page(page: &BoardPage) -> Self {
        Self {
            station_id: page.station_id.clone(),
            generated_at: page.fetched_at,
            total: page.total,
            results: page.results.iter().map(SnapshotEntry::from).collect(),
        }
    }
}

/// Write a snapshot as pretty JSON under `dir`, creating the directory if
/// needed. Returns the path written.
pub async fn write_snapshot(
    dir: &Path,
    snapshot: &StationSnapshot,
) -> Result<PathBuf, BoardError> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(format!(
        "{}-{}.json",
        sanitize_filename(&snapshot.station_id),
        snapshot.generated_at.format("%Y%m%dT%H%M%SZ")
    ));
    let body = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(&path, body).await?;

    info!(
        station = %snapshot.station_id,
        results = snapshot.results.len(),
        path = %path.display(),
        "Wrote station snapshot"
    );
    Ok(path)
}

/// Station ids come from config and URLs; keep only characters safe in a
/// filename.
fn sanitize_filename(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "station".to_string()
    } else {
        cleaned
    }
}
