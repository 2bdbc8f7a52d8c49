use crate::memory::{CacheEvent, MemoryCache};
use crate::{QueryData, QueryKey};
use log::*;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Snapshot of one entry as a consumer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    /// `None` until a pull fetch populates the entry.
    pub data: Option<QueryData>,
    /// A refetch has been requested and has not landed yet.
    pub stale: bool,
}

/// Consumer-side handle that follows one cache entry.
///
/// Reconciled push events and pull fetches both surface here the same way:
/// `changed` wakes up and returns the entry's current state. Consumers never
/// see the individual mutations, only the resulting snapshot.
pub struct QuerySubscription {
    key: QueryKey,
    cache: Arc<MemoryCache>,
    events: broadcast::Receiver<CacheEvent>,
}

impl QuerySubscription {
    pub(crate) fn new(
        key: QueryKey,
        cache: Arc<MemoryCache>,
        events: broadcast::Receiver<CacheEvent>,
    ) -> Self {
        Self { key, cache, events }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QueryState {
        self.cache.state(&self.key)
    }

    /// Waits for the next write or invalidation of this entry.
    ///
    /// Returns `None` once the cache is gone. If this subscriber fell behind
    /// the broadcast buffer it cannot know which changes it missed, so it
    /// returns the current state straight away.
    pub async fn changed(&mut self) -> Option<QueryState> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key() == &self.key => return Some(self.current()),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        "Subscription for {} lagged by {} change(s), re-reading entry",
                        self.key, skipped
                    );
                    return Some(self.current());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryCache;
    use std::time::Duration;

    #[tokio::test]
    async fn test_changed_fires_for_own_key_only() {
        let cache = Arc::new(MemoryCache::new());
        let mut subscription = cache.subscribe(QueryKey::UnreadNotificationCount);

        cache.set(QueryKey::Conversations, QueryData::Conversations(vec![]));
        cache.set(QueryKey::UnreadNotificationCount, QueryData::UnreadCount(3));

        let state = tokio::time::timeout(Duration::from_secs(1), subscription.changed())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state.data, Some(QueryData::UnreadCount(3)));
        assert!(!state.stale);
    }

    #[tokio::test]
    async fn test_changed_reports_invalidation_as_stale() {
        let cache = Arc::new(MemoryCache::new());
        cache.set(QueryKey::UnreadNotificationCount, QueryData::UnreadCount(3));
        let mut subscription = cache.subscribe(QueryKey::UnreadNotificationCount);

        cache.invalidate(&QueryKey::UnreadNotificationCount);

        let state = subscription.changed().await.unwrap();
        assert!(state.stale);
        assert_eq!(state.data, Some(QueryData::UnreadCount(3)));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_gets_latest_state() {
        let cache = Arc::new(MemoryCache::with_event_capacity(2));
        let mut subscription = cache.subscribe(QueryKey::UnreadNotificationCount);

        for n in 0..10 {
            cache.set(QueryKey::UnreadNotificationCount, QueryData::UnreadCount(n));
        }

        let state = subscription.changed().await.unwrap();
        assert_eq!(state.data, Some(QueryData::UnreadCount(9)));
    }
}
