//! GTFS departure board: static table loading, schedule indexing, real-time
//! feed caching and reconciliation.

pub mod error;
pub mod realtime;
pub mod reconcile;
pub mod schedule;
pub mod snapshot;
pub mod static_data;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::config::BoardConfig;

pub use error::BoardError;
pub use types::{BoardPage, DepartureRecord, EventType};

use realtime::{fetch_feed, FeedCache};
use reconcile::VisibilityWindow;
use schedule::ScheduleIndex;

/// The live board: owns the feed cache and ties the schedule index, the
/// real-time feed and the reconciliation engine together behind one handle.
pub struct DepartureBoard {
    client: reqwest::Client,
    config: BoardConfig,
    timezone: Tz,
    window: VisibilityWindow,
    index: Arc<ScheduleIndex>,
    cache: FeedCache,
}

impl DepartureBoard {
    pub fn new(config: BoardConfig, client: reqwest::Client, index: Arc<ScheduleIndex>) -> Self {
        let timezone = config.parsed_timezone();
        let window = VisibilityWindow {
            lookback: Duration::minutes(i64::from(config.lookback_minutes)),
            horizon: Duration::minutes(i64::from(config.horizon_minutes)),
        };
        Self {
            client,
            config,
            timezone,
            window,
            index,
            cache: FeedCache::new(),
        }
    }

    /// Current board page for one station. Serves the cached feed when fresh,
    /// refreshes it otherwise; a failed refresh propagates without disturbing
    /// an earlier snapshot.
    pub async fn departures(
        &self,
        station_id: &str,
        count: Option<usize>,
    ) -> Result<BoardPage, BoardError> {
        let stop_ids = self.index.resolve_stop_ids(station_id);
        let ttl = Duration::seconds(self.config.feed_ttl_secs as i64);
        let snapshot = self
            .cache
            .entities(ttl, || {
                fetch_feed(&self.client, &self.config.realtime_feed_url)
            })
            .await?;

        let mut results = reconcile::reconcile(
            &snapshot.entities,
            &self.index,
            &stop_ids,
            Utc::now(),
            self.timezone,
            &self.window,
        );
        let total = results.len();
        results.truncate(count.unwrap_or(self.config.default_count));

        Ok(BoardPage {
            station_id: station_id.to_string(),
            total,
            results,
            fetched_at: snapshot.fetched_at,
        })
    }

    /// Force a feed refresh regardless of TTL.
    pub async fn refresh(&self) -> Result<DateTime<Utc>, BoardError> {
        let snapshot = self
            .cache
            .entities(Duration::zero(), || {
                fetch_feed(&self.client, &self.config.realtime_feed_url)
            })
            .await?;
        Ok(snapshot.fetched_at)
    }

    /// When the last successful fetch happened, if any.
    pub async fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.cache.peek().await.map(|s| s.fetched_at)
    }

    pub fn index(&self) -> &ScheduleIndex {
        &self.index
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Station ids persisted by the refresh endpoint.
    pub fn snapshot_stations(&self) -> &[String] {
        &self.config.stations
    }

    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.config.snapshot_dir.as_deref().map(Path::new)
    }
}
