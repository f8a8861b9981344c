//! Order store
//!
//! Holds the latest desired-pixel list:
//! - Refreshed from an [`OrderFeed`] on a fixed timer
//! - Replaced wholesale; readers get an immutable [`OrderSnapshot`]
//! - A failed refresh never clears what is already loaded

use crate::error::FeedError;
use crate::types::{Order, OrderSnapshot};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default interval between order refreshes
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Remote source of the order list
#[async_trait]
pub trait OrderFeed: Send + Sync {
    /// Fetch the full current order list
    async fn fetch(&self) -> Result<Vec<Order>, FeedError>;
}

/// Order feed served as a JSON array of `[x, y, colorId]` over HTTP
#[derive(Debug, Clone)]
pub struct HttpOrderFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpOrderFeed {
    /// Create feed reading from `url`
    #[inline]
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Feed URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OrderFeed for HttpOrderFeed {
    async fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| FeedError::Parse(e.to_string()))
    }
}

/// Latest order list, shared by every placement loop
pub struct OrderStore {
    feed: Arc<dyn OrderFeed>,
    snapshot: RwLock<Option<OrderSnapshot>>,
}

impl OrderStore {
    /// Create empty store over `feed`
    #[must_use]
    pub fn new(feed: Arc<dyn OrderFeed>) -> Self {
        Self {
            feed,
            snapshot: RwLock::new(None),
        }
    }

    /// Fetch the feed and publish the result
    ///
    /// # Returns
    /// Number of orders now loaded
    ///
    /// # Errors
    /// Returns the feed error; the previous snapshot stays in place
    pub async fn refresh(&self) -> Result<usize, FeedError> {
        tracing::debug!("Loading new placement orders");

        let orders = match self.feed.fetch().await {
            Ok(orders) => orders,
            Err(err) => {
                tracing::warn!(error = %err, "Could not load new placement orders");
                return Err(err);
            }
        };

        let count = orders.len();
        let changed = self
            .snapshot
            .read()
            .as_ref()
            .map_or(true, |current| **current != orders);
        if changed {
            tracing::info!(count, "Loaded new placement orders");
        } else {
            tracing::debug!(count, "Placement orders unchanged");
        }

        *self.snapshot.write() = Some(Arc::new(orders));
        Ok(count)
    }

    /// Whether any refresh has ever succeeded
    #[inline]
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Last published snapshot, `None` before the first successful refresh
    #[inline]
    #[must_use]
    pub fn loaded(&self) -> Option<OrderSnapshot> {
        self.snapshot.read().clone()
    }

    /// Last published snapshot, empty before the first successful refresh
    ///
    /// Check [`has_data`](Self::has_data) before reading an empty snapshot
    /// as "nothing to do".
    #[must_use]
    pub fn current_snapshot(&self) -> OrderSnapshot {
        self.loaded().unwrap_or_default()
    }

    /// Refresh on a fixed interval, forever
    ///
    /// The first refresh happens one `interval` after spawning; callers do
    /// the initial load themselves.
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let _ = store.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted responses; repeats the last one when exhausted
    struct ScriptedFeed {
        responses: Mutex<VecDeque<Result<Vec<Order>, FeedError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Result<Vec<Order>, FeedError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderFeed for ScriptedFeed {
        async fn fetch(&self) -> Result<Vec<Order>, FeedError> {
            *self.calls.lock() += 1;
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                responses.pop_front().unwrap_or(Err(FeedError::Status(500)))
            } else {
                responses.front().cloned().unwrap_or(Err(FeedError::Status(500)))
            }
        }
    }

    #[tokio::test]
    async fn empty_before_first_refresh() {
        let store = OrderStore::new(Arc::new(ScriptedFeed::new(vec![])));

        assert!(!store.has_data());
        assert!(store.loaded().is_none());
        assert!(store.current_snapshot().is_empty());
    }

    #[tokio::test]
    async fn refresh_publishes_snapshot() {
        let feed = ScriptedFeed::new(vec![Ok(vec![Order::new(5, 5, 1)])]);
        let store = OrderStore::new(Arc::new(feed));

        assert_eq!(store.refresh().await, Ok(1));
        assert!(store.has_data());
        assert_eq!(*store.current_snapshot(), vec![Order::new(5, 5, 1)]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let feed = ScriptedFeed::new(vec![Ok(vec![Order::new(5, 5, 1)]), Err(FeedError::Status(503))]);
        let store = OrderStore::new(Arc::new(feed));

        store.refresh().await.unwrap();
        assert_eq!(store.refresh().await, Err(FeedError::Status(503)));

        assert!(store.has_data());
        assert_eq!(*store.current_snapshot(), vec![Order::new(5, 5, 1)]);
    }

    #[tokio::test]
    async fn held_snapshot_survives_replacement() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![Order::new(1, 1, 1)]),
            Ok(vec![Order::new(2, 2, 2), Order::new(3, 3, 3)]),
        ]);
        let store = OrderStore::new(Arc::new(feed));

        store.refresh().await.unwrap();
        let in_flight = store.current_snapshot();
        store.refresh().await.unwrap();

        assert_eq!(*in_flight, vec![Order::new(1, 1, 1)]);
        assert_eq!(store.current_snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_fires_on_interval() {
        let feed = Arc::new(ScriptedFeed::new(vec![Ok(vec![Order::new(0, 0, 0)])]));
        let store = Arc::new(OrderStore::new(feed.clone()));

        let handle = store.spawn_refresher(Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*feed.calls.lock(), 0);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(*feed.calls.lock(), 1);
        assert!(store.has_data());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(*feed.calls.lock(), 2);

        handle.abort();
    }
}
