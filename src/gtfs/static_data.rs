//! Static schedule tables (stops, stop_times, routes).
//!
//! Reads the three CSV tables from a local directory, optionally downloading
//! missing files from a configured base URL first. A table that cannot be
//! read degrades to an empty row collection with a logged warning; the board
//! then runs in "no schedule data" mode instead of failing.

use std::io::Read;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::error::BoardError;

/// Maximum allowed download size per static table file (100 MB)
const MAX_DOWNLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// The three table files consumed by the schedule index.
pub const STOPS_FILE: &str = "stops.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const ROUTES_FILE: &str = "routes.txt";

/// A row of stops.txt.
#[derive(Debug, Clone)]
pub struct StopRow {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub parent_station: Option<String>,
}

/// A row of stop_times.txt. Times are kept as raw `HH:MM:SS` strings; hours
/// may exceed 24 for post-midnight service.
#[derive(Debug, Clone)]
pub struct StopTimeRow {
    pub trip_id: String,
    pub stop_id: String,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
}

/// A row of routes.txt.
#[derive(Debug, Clone)]
pub struct RouteRow {
    pub route_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

/// The raw row collections handed to the schedule index. Empty collections
/// are valid input.
#[derive(Debug, Clone, Default)]
pub struct StaticTables {
    pub stops: Vec<StopRow>,
    pub stop_times: Vec<StopTimeRow>,
    pub routes: Vec<RouteRow>,
}

/// Load all three tables. Per-table failures are logged and degrade to empty
/// collections; this function itself never fails.
pub async fn load_tables(
    client: &reqwest::Client,
    static_dir: &Path,
    base_url: Option<&str>,
) -> StaticTables {
    let stops = load_table(client, static_dir, base_url, STOPS_FILE, |file| {
        parse_stops(file)
    })
    .await;
    let stop_times = load_table(client, static_dir, base_url, STOP_TIMES_FILE, |file| {
        parse_stop_times(file)
    })
    .await;
    let routes = load_table(client, static_dir, base_url, ROUTES_FILE, |file| {
        parse_routes(file)
    })
    .await;

    info!(
        stops = stops.len(),
        stop_times = stop_times.len(),
        routes = routes.len(),
        "Loaded static schedule tables"
    );

    StaticTables {
        stops,
        stop_times,
        routes,
    }
}

async fn load_table<T, F>(
    client: &reqwest::Client,
    static_dir: &Path,
    base_url: Option<&str>,
    filename: &'static str,
    parse: F,
) -> Vec<T>
where
    T: Send + 'static,
    F: FnOnce(std::fs::File) -> Result<Vec<T>, BoardError> + Send + 'static,
{
    let path = match ensure_file(client, static_dir, base_url, filename).await {
        Ok(path) => path,
        Err(e) => {
            warn!(file = filename, error = %e, "Static table unavailable, continuing with empty table");
            return Vec::new();
        }
    };

    let parsed = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        parse(file)
    })
    .await;

    match parsed {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            warn!(file = filename, error = %e, "Failed to parse static table, continuing with empty table");
            Vec::new()
        }
        Err(e) => {
            warn!(file = filename, error = %e, "Static table parse task failed, continuing with empty table");
            Vec::new()
        }
    }
}

/// Resolve the local path for a table file, downloading it first when it is
/// missing and a base URL is configured.
async fn ensure_file(
    client: &reqwest::Client,
    static_dir: &Path,
    base_url: Option<&str>,
    filename: &str,
) -> Result<PathBuf, BoardError> {
    let local_path = static_dir.join(filename);
    if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
        return Ok(local_path);
    }

    let Some(base_url) = base_url else {
        return Err(BoardError::NetworkMessage(format!(
            "{} not present locally and no download URL configured",
            filename
        )));
    };

    tokio::fs::create_dir_all(static_dir).await?;
    let url = format!("{}/{}", base_url.trim_end_matches('/'), filename);
    info!(file = filename, url = %url, "Downloading static table");
    download_file(client, &url, &local_path).await?;
    Ok(local_path)
}

/// Stream a table file to disk with a size cap.
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), BoardError> {
    let response = client
        .get(url)
        .timeout(std::time::Duration::from_secs(120))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(BoardError::NetworkMessage(format!(
            "static table download HTTP {}",
            response.status()
        )));
    }

    if let Some(content_length) = response.content_length() {
        if content_length > MAX_DOWNLOAD_SIZE {
            return Err(BoardError::NetworkMessage(format!(
                "static table too large: {} bytes (max {} bytes)",
                content_length, MAX_DOWNLOAD_SIZE
            )));
        }
    }

    let mut total_bytes: u64 = 0;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total_bytes += chunk.len() as u64;
        if total_bytes > MAX_DOWNLOAD_SIZE {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(BoardError::NetworkMessage(format!(
                "static table download exceeded size limit at {} bytes",
                total_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    info!(size_bytes = total_bytes, dest = %dest.display(), "Downloaded static table");
    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// --- CSV parsing ---
//
// Header-position based: a table with extra or reordered columns still
// parses, and a row missing its id field is skipped and counted rather than
// aborting the load.

pub fn parse_stops<R: Read>(reader: R) -> Result<Vec<StopRow>, BoardError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let Some(idx_id) = headers.iter().position(|h| h == "stop_id") else {
        warn!("stops.txt missing stop_id column");
        return Ok(Vec::new());
    };
    let idx_name = headers.iter().position(|h| h == "stop_name");
    let idx_parent = headers.iter().position(|h| h == "parent_station");

    let mut stops = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let stop_id = record.get(idx_id).unwrap_or("").to_string();
        if stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        stops.push(StopRow {
            stop_id,
            stop_name: idx_name.and_then(|i| record.get(i)).and_then(non_empty),
            parent_station: idx_parent
                .and_then(|i| record.get(i))
                .and_then(non_empty),
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stops.txt records (empty/unparseable)");
    }
    Ok(stops)
}

pub fn parse_stop_times<R: Read>(reader: R) -> Result<Vec<StopTimeRow>, BoardError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let Some(idx_trip) = headers.iter().position(|h| h == "trip_id") else {
        warn!("stop_times.txt missing trip_id column");
        return Ok(Vec::new());
    };
    let Some(idx_stop) = headers.iter().position(|h| h == "stop_id") else {
        warn!("stop_times.txt missing stop_id column");
        return Ok(Vec::new());
    };
    let idx_arr = headers.iter().position(|h| h == "arrival_time");
    let idx_dep = headers.iter().position(|h| h == "departure_time");

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        let stop_id = record.get(idx_stop).unwrap_or("").to_string();
        if trip_id.is_empty() || stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        rows.push(StopTimeRow {
            trip_id,
            stop_id,
            arrival_time: idx_arr.and_then(|i| record.get(i)).and_then(non_empty),
            departure_time: idx_dep.and_then(|i| record.get(i)).and_then(non_empty),
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records (empty/unparseable)");
    }
    Ok(rows)
}

pub fn parse_routes<R: Read>(reader: R) -> Result<Vec<RouteRow>, BoardError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let Some(idx_id) = headers.iter().position(|h| h == "route_id") else {
        warn!("routes.txt missing route_id column");
        return Ok(Vec::new());
    };
    let idx_short = headers.iter().position(|h| h == "route_short_name");
    let idx_long = headers.iter().position(|h| h == "route_long_name");

    let mut routes = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let route_id = record.get(idx_id).unwrap_or("").to_string();
        if route_id.is_empty() {
            skipped += 1;
            continue;
        }
        routes.push(RouteRow {
            route_id,
            short_name: idx_short.and_then(|i| record.get(i)).and_then(non_empty),
            long_name: idx_long.and_then(|i| record.get(i)).and_then(non_empty),
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped routes.txt records (empty/unparseable)");
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stops_basic() {
        let csv = "stop_id,stop_name,parent_station\n\
                   1153,King George Square platform 1,place_kgbs\n\
                   place_kgbs,King George Square,\n";
        let stops = parse_stops(csv.as_bytes()).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].stop_id, "1153");
        assert_eq!(
            stops[0].stop_name.as_deref(),
            Some("King George Square platform 1")
        );
        assert_eq!(stops[0].parent_station.as_deref(), Some("place_kgbs"));
        assert_eq!(stops[1].parent_station, None);
    }

    #[test]
    fn parse_stops_skips_rows_without_id() {
        let csv = "stop_id,stop_name\n\
                   ,Nameless\n\
                   1153,Valid\n";
        let stops = parse_stops(csv.as_bytes()).unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].stop_id, "1153");
    }

    #[test]
    fn parse_stops_reordered_columns() {
        let csv = "stop_name,parent_station,stop_id\n\
                   Central,place_cen,600012\n";
        let stops = parse_stops(csv.as_bytes()).unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].stop_id, "600012");
        assert_eq!(stops[0].stop_name.as_deref(), Some("Central"));
    }

    #[test]
    fn parse_stops_missing_id_column_yields_empty() {
        let csv = "stop_name\nCentral\n";
        let stops = parse_stops(csv.as_bytes()).unwrap();
        assert!(stops.is_empty());
    }

    #[test]
    fn parse_stop_times_basic() {
        let csv = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                   T1,08:00:00,08:01:00,1153,1\n\
                   T1,25:30:00,,1157,2\n";
        let rows = parse_stop_times(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trip_id, "T1");
        assert_eq!(rows[0].departure_time.as_deref(), Some("08:01:00"));
        assert_eq!(rows[1].arrival_time.as_deref(), Some("25:30:00"));
        assert_eq!(rows[1].departure_time, None);
    }

    #[test]
    fn parse_stop_times_skips_incomplete_rows() {
        let csv = "trip_id,stop_id,departure_time\n\
                   T1,,08:00:00\n\
                   ,1153,08:00:00\n\
                   T1,1153,08:00:00\n";
        let rows = parse_stop_times(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn parse_routes_basic() {
        let csv = "route_id,route_short_name,route_long_name\n\
                   333-4158,333,Chermside - City\n\
                   FERRY-1,,CityCat\n";
        let routes = parse_routes(csv.as_bytes()).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].short_name.as_deref(), Some("333"));
        assert_eq!(routes[1].short_name, None);
        assert_eq!(routes[1].long_name.as_deref(), Some("CityCat"));
    }

    #[test]
    fn parse_empty_input_is_valid() {
        let rows = parse_stop_times("trip_id,stop_id\n".as_bytes()).unwrap();
        assert!(rows.is_empty());
    }
}
