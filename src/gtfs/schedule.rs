//! Lookup structures built from the static tables, plus station resolution.
//!
//! Built once at startup and shared immutably; reconciliation reads these
//! maps without locking.

use std::collections::{HashMap, HashSet};

use tracing::info;

use super::static_data::StaticTables;

/// A fallback schedule entry keyed by (route short name, stop id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    /// Time of day as `HH:MM:SS`; hours may exceed 24.
    pub time: String,
    pub trip_id: String,
    pub route_id: String,
}

/// Raw row counts per table, surfaced by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub stops: usize,
    pub stop_times: usize,
    pub routes: usize,
}

pub struct ScheduleIndex {
    /// stop_id -> display name
    stop_names: HashMap<String, String>,
    /// parent station id -> child stop ids (stops with a blank parent are excluded)
    parent_stations: HashMap<String, HashSet<String>>,
    /// (trip_id, stop_id) -> scheduled time of day; last write wins on duplicates
    scheduled_times: HashMap<(String, String), String>,
    /// (route short name, stop_id) -> candidates, in stop_times row order
    route_candidates: HashMap<(String, String), Vec<RouteCandidate>>,
    /// route_id -> "<short> <long>" display name
    route_names: HashMap<String, String>,
    counts: TableCounts,
}

impl ScheduleIndex {
    /// Build all lookup structures, one pass per table. Rows already filtered
    /// by the loader; anything still missing a usable time is skipped here.
    pub fn build(tables: &StaticTables) -> Self {
        let mut stop_names = HashMap::new();
        let mut parent_stations: HashMap<String, HashSet<String>> = HashMap::new();
        for stop in &tables.stops {
            if let Some(name) = &stop.stop_name {
                stop_names.insert(stop.stop_id.clone(), name.clone());
            }
            if let Some(parent) = &stop.parent_station {
                parent_stations
                    .entry(parent.clone())
                    .or_default()
                    .insert(stop.stop_id.clone());
            }
        }

        let mut route_names = HashMap::new();
        let mut short_names: Vec<(String, String)> = Vec::new();
        for route in &tables.routes {
            let display = match (&route.short_name, &route.long_name) {
                (Some(short), Some(long)) => Some(format!("{} {}", short, long)),
                (Some(short), None) => Some(short.clone()),
                (None, Some(long)) => Some(long.clone()),
                (None, None) => None,
            };
            if let Some(display) = display {
                route_names.insert(route.route_id.clone(), display);
            }
            if let Some(short) = &route.short_name {
                short_names.push((short.clone(), route.route_id.clone()));
            }
        }

        let mut scheduled_times = HashMap::new();
        let mut route_candidates: HashMap<(String, String), Vec<RouteCandidate>> =
            HashMap::new();
        for row in &tables.stop_times {
            let Some(time) = row.departure_time.as_ref().or(row.arrival_time.as_ref())
            else {
                continue;
            };
            scheduled_times.insert(
                (row.trip_id.clone(), row.stop_id.clone()),
                time.clone(),
            );

            // Fallback tier: every stop-time row is tested against every
            // route whose short name occurs in the trip id, first match
            // only. O(stop_times x routes) worst case, accepted so the
            // fallback keeps its exact matching semantics.
            if let Some((short, route_id)) = short_names
                .iter()
                .find(|(short, _)| row.trip_id.contains(short.as_str()))
            {
                route_candidates
                    .entry((short.clone(), row.stop_id.clone()))
                    .or_default()
                    .push(RouteCandidate {
                        time: time.clone(),
                        trip_id: row.trip_id.clone(),
                        route_id: route_id.clone(),
                    });
            }
        }

        let counts = TableCounts {
            stops: tables.stops.len(),
            stop_times: tables.stop_times.len(),
            routes: tables.routes.len(),
        };

        info!(
            stops = counts.stops,
            scheduled_times = scheduled_times.len(),
            parent_stations = parent_stations.len(),
            candidate_keys = route_candidates.len(),
            "Built schedule index"
        );

        Self {
            stop_names,
            parent_stations,
            scheduled_times,
            route_candidates,
            route_names,
            counts,
        }
    }

    /// Expand a station id into the physical stop ids it may appear under in
    /// the feed: the id itself plus any child stops of that parent station.
    /// An unknown id yields just the singleton set.
    pub fn resolve_stop_ids(&self, station_id: &str) -> HashSet<String> {
        let mut ids = HashSet::new();
        ids.insert(station_id.to_string());
        if let Some(children) = self.parent_stations.get(station_id) {
            ids.extend(children.iter().cloned());
        }
        ids
    }

    pub fn stop_name(&self, stop_id: &str) -> Option<&str> {
        self.stop_names.get(stop_id).map(String::as_str)
    }

    pub fn route_display_name(&self, route_id: &str) -> Option<&str> {
        self.route_names.get(route_id).map(String::as_str)
    }

    pub fn scheduled_time(&self, trip_id: &str, stop_id: &str) -> Option<&str> {
        self.scheduled_times
            .get(&(trip_id.to_string(), stop_id.to_string()))
            .map(String::as_str)
    }

    pub fn candidates(&self, short_name: &str, stop_id: &str) -> Option<&[RouteCandidate]> {
        self.route_candidates
            .get(&(short_name.to_string(), stop_id.to_string()))
            .map(Vec::as_slice)
    }

    /// Parent station ids, for the station list endpoint.
    pub fn parent_station_ids(&self) -> impl Iterator<Item = &str> {
        self.parent_stations.keys().map(String::as_str)
    }

    pub fn counts(&self) -> TableCounts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::static_data::{RouteRow, StopRow, StopTimeRow};

    fn make_tables() -> StaticTables {
        StaticTables {
            stops: vec![
                StopRow {
                    stop_id: "A".into(),
                    stop_name: Some("Platform A".into()),
                    parent_station: Some("P".into()),
                },
                StopRow {
                    stop_id: "B".into(),
                    stop_name: Some("Platform B".into()),
                    parent_station: Some("P".into()),
                },
                StopRow {
                    stop_id: "P".into(),
                    stop_name: Some("Parent Station".into()),
                    parent_station: None,
                },
                StopRow {
                    stop_id: "lonely".into(),
                    stop_name: None,
                    parent_station: None,
                },
            ],
            stop_times: vec![
                StopTimeRow {
                    trip_id: "333-4158-T1".into(),
                    stop_id: "A".into(),
                    arrival_time: Some("07:59:30".into()),
                    departure_time: Some("08:00:00".into()),
                },
                StopTimeRow {
                    trip_id: "333-4158-T2".into(),
                    stop_id: "A".into(),
                    arrival_time: None,
                    departure_time: Some("08:05:00".into()),
                },
                StopTimeRow {
                    trip_id: "999-no-route".into(),
                    stop_id: "B".into(),
                    arrival_time: Some("09:00:00".into()),
                    departure_time: None,
                },
            ],
            routes: vec![
                RouteRow {
                    route_id: "333-4158".into(),
                    short_name: Some("333".into()),
                    long_name: Some("Chermside - City".into()),
                },
                RouteRow {
                    route_id: "NONAME".into(),
                    short_name: None,
                    long_name: None,
                },
            ],
        }
    }

    #[test]
    fn exact_schedule_lookup() {
        let index = ScheduleIndex::build(&make_tables());
        assert_eq!(index.scheduled_time("333-4158-T1", "A"), Some("08:00:00"));
        // Departure preferred over arrival; arrival used when departure absent.
        assert_eq!(index.scheduled_time("999-no-route", "B"), Some("09:00:00"));
        assert_eq!(index.scheduled_time("333-4158-T1", "B"), None);
    }

    #[test]
    fn duplicate_trip_stop_last_write_wins() {
        let mut tables = make_tables();
        tables.stop_times.push(StopTimeRow {
            trip_id: "333-4158-T1".into(),
            stop_id: "A".into(),
            arrival_time: None,
            departure_time: Some("08:30:00".into()),
        });
        let index = ScheduleIndex::build(&tables);
        assert_eq!(index.scheduled_time("333-4158-T1", "A"), Some("08:30:00"));
    }

    #[test]
    fn route_candidates_built_by_substring() {
        let index = ScheduleIndex::build(&make_tables());
        let cands = index.candidates("333", "A").expect("candidates for 333|A");
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].time, "08:00:00");
        assert_eq!(cands[0].trip_id, "333-4158-T1");
        assert_eq!(cands[0].route_id, "333-4158");
        assert_eq!(cands[1].time, "08:05:00");
        // Trip id matching no route short name contributes no candidate.
        assert!(index.candidates("999", "B").is_none());
    }

    #[test]
    fn route_display_names() {
        let index = ScheduleIndex::build(&make_tables());
        assert_eq!(
            index.route_display_name("333-4158"),
            Some("333 Chermside - City")
        );
        assert_eq!(index.route_display_name("NONAME"), None);
    }

    #[test]
    fn resolver_unions_parent_and_children() {
        let index = ScheduleIndex::build(&make_tables());
        let ids = index.resolve_stop_ids("P");
        assert_eq!(
            ids,
            ["P", "A", "B"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn resolver_unknown_station_is_singleton() {
        let index = ScheduleIndex::build(&make_tables());
        let ids = index.resolve_stop_ids("nowhere");
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("nowhere"));
    }

    #[test]
    fn indexing_is_idempotent() {
        let tables = make_tables();
        let a = ScheduleIndex::build(&tables);
        let b = ScheduleIndex::build(&tables);
        assert_eq!(a.scheduled_times, b.scheduled_times);
        assert_eq!(a.route_candidates, b.route_candidates);
        assert_eq!(a.stop_names, b.stop_names);
        assert_eq!(a.parent_stations, b.parent_stations);
        assert_eq!(a.route_names, b.route_names);
        assert_eq!(a.counts, b.counts);
    }

    #[test]
    fn empty_tables_build_empty_index() {
        let index = ScheduleIndex::build(&StaticTables::default());
        assert_eq!(index.counts(), TableCounts::default());
        assert!(index.scheduled_time("T", "S").is_none());
        assert_eq!(index.resolve_stop_ids("X").len(), 1);
    }
}
