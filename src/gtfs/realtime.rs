//! GTFS-RT feed fetch/decode and the freshness-bounded feed cache.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use prost::Message;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::error::BoardError;

/// Maximum allowed protobuf response size (50 MB)
const MAX_PROTOBUF_SIZE: usize = 50 * 1024 * 1024;

/// Fetch and decode the GTFS-RT protobuf feed.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
) -> Result<gtfs_realtime::FeedMessage, BoardError> {
    let response = client
        .get(url)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(BoardError::NetworkMessage(format!(
            "GTFS-RT HTTP {}",
            response.status()
        )));
    }

    let bytes = response.bytes().await?;

    if bytes.len() > MAX_PROTOBUF_SIZE {
        return Err(BoardError::NetworkMessage(format!(
            "GTFS-RT response too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_PROTOBUF_SIZE
        )));
    }

    gtfs_realtime::FeedMessage::decode(bytes.as_ref()).map_err(BoardError::from)
}

/// One fully-formed fetch result. Cheap to clone; the entity list is shared.
#[derive(Clone, Debug)]
pub struct FeedSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub entities: Arc<Vec<gtfs_realtime::FeedEntity>>,
}

/// Holds the most recent decoded feed and serves it within a TTL window.
///
/// The `{fetched_at, entities}` pair is replaced atomically under the state
/// lock; readers always observe a complete snapshot. A separate refresh
/// mutex serializes fetches so concurrent stale readers trigger exactly one
/// upstream request, and a completed fetch is never overwritten by an older
/// in-flight one.
pub struct FeedCache {
    state: RwLock<Option<FeedSnapshot>>,
    refresh: Mutex<()>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Return the cached entities when fresher than `ttl`, otherwise run
    /// `fetch` and replace the cache. A zero (or negative) TTL forces an
    /// unconditional refresh. On fetch failure the cache is left untouched
    /// and the error propagates.
    pub async fn entities<F, Fut>(
        &self,
        ttl: Duration,
        fetch: F,
    ) -> Result<FeedSnapshot, BoardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<gtfs_realtime::FeedMessage, BoardError>>,
    {
        if let Some(snapshot) = self.fresh(ttl).await {
            debug!(fetched_at = %snapshot.fetched_at, "Serving cached feed");
            return Ok(snapshot);
        }

        let _flight = self.refresh.lock().await;

        // Another request may have refreshed while we waited for the lock.
        if let Some(snapshot) = self.fresh(ttl).await {
            debug!(fetched_at = %snapshot.fetched_at, "Feed refreshed by concurrent request");
            return Ok(snapshot);
        }

        let feed = fetch().await?;
        let snapshot = FeedSnapshot {
            fetched_at: Utc::now(),
            entities: Arc::new(feed.entity),
        };
        info!(
            entities = snapshot.entities.len(),
            "Refreshed real-time feed"
        );
        *self.state.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// The current snapshot regardless of freshness, if any fetch has ever
    /// succeeded.
    pub async fn peek(&self) -> Option<FeedSnapshot> {
        self.state.read().await.clone()
    }

    async fn fresh(&self, ttl: Duration) -> Option<FeedSnapshot> {
        if ttl <= Duration::zero() {
            return None;
        }
        let guard = self.state.read().await;
        guard
            .as_ref()
            .filter(|s| Utc::now() - s.fetched_at < ttl)
            .cloned()
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_feed(entity_ids: &[&str]) -> gtfs_realtime::FeedMessage {
        gtfs_realtime::FeedMessage {
            header: gtfs_realtime::FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: Some(0),
                timestamp: Some(1000000),
                feed_version: None,
            },
            entity: entity_ids
                .iter()
                .map(|id| gtfs_realtime::FeedEntity {
                    id: id.to_string(),
                    is_deleted: None,
                    trip_update: None,
                    vehicle: None,
                    alert: None,
                    shape: None,
                    stop: None,
                    trip_modifications: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn second_read_within_ttl_hits_cache() {
        let cache = FeedCache::new();
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        let first = cache
            .entities(Duration::seconds(180), || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(make_feed(&["e1"]))
            })
            .await
            .unwrap();

        let second = cache
            .entities(Duration::seconds(180), || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(make_feed(&["e2"]))
            })
            .await
            .unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.entities, &second.entities));
        assert_eq!(second.entities[0].id, "e1");
    }

    #[tokio::test]
    async fn zero_ttl_forces_refresh() {
        let cache = FeedCache::new();
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        for _ in 0..2 {
            cache
                .entities(Duration::zero(), || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(make_feed(&["e1"]))
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let cache = FeedCache::new();

        cache
            .entities(Duration::seconds(180), || async { Ok(make_feed(&["good"])) })
            .await
            .unwrap();

        let err = cache
            .entities(Duration::zero(), || async {
                Err(BoardError::NetworkMessage("upstream down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::NetworkMessage(_)));

        let stale = cache.peek().await.expect("prior snapshot retained");
        assert_eq!(stale.entities[0].id, "good");
    }

    #[tokio::test]
    async fn error_with_empty_cache_stays_empty() {
        let cache = FeedCache::new();
        let result = cache
            .entities(Duration::seconds(180), || async {
                Err(BoardError::NetworkMessage("upstream down".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.peek().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_stale_reads_fetch_once() {
        let cache = Arc::new(FeedCache::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let a = {
            let cache = cache.clone();
            let fetches = fetches.clone();
            tokio::spawn(async move {
                cache
                    .entities(Duration::seconds(180), || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        // Hold the flight open long enough for the other
                        // request to queue behind the refresh lock.
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(make_feed(&["shared"]))
                    })
                    .await
            })
        };
        let b = {
            let cache = cache.clone();
            let fetches = fetches.clone();
            tokio::spawn(async move {
                cache
                    .entities(Duration::seconds(180), || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        Ok(make_feed(&["shared"]))
                    })
                    .await
            })
        };

        let (a, b) = tokio::join!(a, b);
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.entities, &b.entities));
    }
}
