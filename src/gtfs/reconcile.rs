//! The reconciliation engine: matches real-time stop-time updates against
//! the schedule index and produces sorted, windowed departure records.
//!
//! Pure computation; the feed cache is the only component that touches I/O.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use super::schedule::ScheduleIndex;
use super::types::{DepartureRecord, EventType};

/// GTFS-RT StopTimeUpdate.ScheduleRelationship SKIPPED
const SKIPPED: i32 = 1;

/// A route-based fallback candidate further than this from the predicted
/// time of day is never accepted.
const ROUTE_MATCH_MAX_MINUTES: i32 = 30;

/// How far around "now" a predicted event may lie and still be shown.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityWindow {
    pub lookback: Duration,
    pub horizon: Duration,
}

impl Default for VisibilityWindow {
    fn default() -> Self {
        Self {
            lookback: Duration::minutes(5),
            horizon: Duration::hours(2),
        }
    }
}

/// Walk the feed entities and emit one record per stop-time update that
/// targets one of `stop_ids`. Entities that are not trip updates (vehicle
/// positions, alerts) are ignored; a malformed update skips itself, never
/// the batch.
pub fn reconcile(
    entities: &[gtfs_realtime::FeedEntity],
    index: &ScheduleIndex,
    stop_ids: &HashSet<String>,
    now: DateTime<Utc>,
    tz: Tz,
    window: &VisibilityWindow,
) -> Vec<DepartureRecord> {
    let mut records = Vec::new();
    let mut trip_updates = 0u64;

    for entity in entities {
        let Some(trip_update) = &entity.trip_update else {
            continue;
        };
        trip_updates += 1;

        let Some(trip_id) = trip_update.trip.trip_id.as_deref() else {
            continue;
        };
        let route_id = trip_update.trip.route_id.clone().unwrap_or_default();

        for stu in &trip_update.stop_time_update {
            let Some(stop_id) = stu.stop_id.as_deref() else {
                continue;
            };
            if !stop_ids.contains(stop_id) {
                continue;
            }
            if stu.schedule_relationship == Some(SKIPPED) {
                continue;
            }

            // Arrival preferred over departure when both exist.
            let (event, event_type) = match (&stu.arrival, &stu.departure) {
                (Some(arrival), _) => (Some(arrival), EventType::Arrival),
                (None, Some(departure)) => (Some(departure), EventType::Departure),
                (None, None) => (None, EventType::Unknown),
            };

            let predicted_ts = event.and_then(event_epoch_millis);
            let delay_seconds = event.and_then(|e| e.delay);

            let predicted = predicted_ts.and_then(DateTime::from_timestamp_millis);
            let predicted_local = predicted.map(|t| t.with_timezone(&tz));

            if let Some(instant) = predicted {
                if instant < now - window.lookback || instant > now + window.horizon {
                    continue;
                }
            }

            let scheduled =
                resolve_scheduled(index, trip_id, stop_id, &route_id, predicted_local.as_ref());

            records.push(DepartureRecord {
                trip_id: trip_id.to_string(),
                route_id: route_id.clone(),
                route_name: index
                    .route_display_name(&route_id)
                    .map(str::to_string)
                    .or_else(|| (!route_id.is_empty()).then(|| route_id.clone())),
                // The decoded TripDescriptor carries no headsign; the field
                // stays nullable on the wire.
                headsign: None,
                stop_id: stop_id.to_string(),
                stop_name: index.stop_name(stop_id).map(str::to_string),
                scheduled,
                predicted: predicted
                    .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
                predicted_local: predicted_local
                    .map(|t| t.format("%H:%M:%S").to_string()),
                predicted_ts,
                event_type,
                status: delay_status(delay_seconds),
                delay_seconds,
            });
        }
    }

    debug!(
        trip_updates,
        matched = records.len(),
        "Reconciled real-time feed"
    );

    sort_records(&mut records);
    records
}

/// Epoch milliseconds from a stop-time event's 64-bit epoch seconds. The
/// single conversion point for feed time values.
pub fn event_epoch_millis(event: &gtfs_realtime::trip_update::StopTimeEvent) -> Option<i64> {
    event.time.map(|secs| secs * 1000)
}

/// Resolve a scheduled time of day for one stop-time update. Three tiers,
/// first hit wins: exact (trip, stop) lookup, route-short-name candidate
/// within 30 minutes of the prediction, then a time synthesized from the
/// prediction itself.
fn resolve_scheduled(
    index: &ScheduleIndex,
    trip_id: &str,
    stop_id: &str,
    route_id: &str,
    predicted_local: Option<&DateTime<Tz>>,
) -> Option<String> {
    if let Some(time) = index.scheduled_time(trip_id, stop_id) {
        return Some(time.to_string());
    }

    let short = route_short_name(route_id);
    if !short.is_empty() {
        if let Some(candidates) = index.candidates(short, stop_id) {
            match predicted_local {
                Some(local) => {
                    let target = (local.hour() * 60 + local.minute()) as i32;
                    let mut best: Option<(&str, i32)> = None;
                    for candidate in candidates {
                        let Some(minute) = minute_of_day(&candidate.time) else {
                            continue;
                        };
                        let distance = (minute - target).abs();
                        if best.map_or(true, |(_, d)| distance < d) {
                            best = Some((&candidate.time, distance));
                        }
                    }
                    if let Some((time, distance)) = best {
                        if distance <= ROUTE_MATCH_MAX_MINUTES {
                            return Some(time.to_string());
                        }
                    }
                }
                None => {
                    if let Some(candidate) = candidates.first() {
                        return Some(candidate.time.clone());
                    }
                }
            }
        }
    }

    predicted_local.map(|local| local.format("%H:%M:00").to_string())
}

/// Route short name by convention: the route id up to its first `-`.
fn route_short_name(route_id: &str) -> &str {
    route_id.split('-').next().unwrap_or_default()
}

/// Minute of day for an `HH:MM:SS` string; hours past 24 wrap to the next
/// service day's clock time.
fn minute_of_day(time: &str) -> Option<i32> {
    let mut parts = time.split(':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = parts.next()?.parse().ok()?;
    if !(0..60).contains(&minutes) || hours < 0 {
        return None;
    }
    Some((hours % 24) * 60 + minutes)
}

/// Human-readable status from the feed's own delay field, which is treated
/// as authoritative when present.
fn delay_status(delay_seconds: Option<i32>) -> String {
    match delay_seconds {
        Some(d) if d > 60 => format!("Delayed +{}m", (f64::from(d) / 60.0).round() as i64),
        Some(d) if d < -60 => format!("Early {}m", (f64::from(-d) / 60.0).round() as i64),
        Some(_) => "On time".to_string(),
        None => "Scheduled".to_string(),
    }
}

/// Stable sort: predicted instants ascending, predictions before
/// schedule-only records, schedule-only records by their time string
/// (lexicographic comparison is valid for zero-padded HH:MM:SS).
fn sort_records(records: &mut [DepartureRecord]) {
    records.sort_by(|a, b| match (a.predicted_ts, b.predicted_ts) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.scheduled.cmp(&b.scheduled),
    });
}
