use crate::pull::Fetch;
use cache::{CacheEvent, MemoryCache, QueryCache, QueryKey};
use log::*;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Fetches `key` and stores the result. Failures are logged and leave the
/// entry as it was, still marked stale.
pub async fn refetch(cache: &dyn QueryCache, fetcher: &dyn Fetch, key: &QueryKey) -> bool {
    match fetcher.fetch(key).await {
        Ok(data) => {
            cache.set(key.clone(), data);
            true
        }
        Err(e) => {
            warn!("Refetch of {key} failed: {e}");
            false
        }
    }
}

/// Loads the initial entries a session starts from. Returns how many loaded.
pub async fn prime(cache: &dyn QueryCache, fetcher: &dyn Fetch, keys: &[QueryKey]) -> usize {
    let mut loaded = 0;
    for key in keys {
        if refetch(cache, fetcher, key).await {
            loaded += 1;
        }
    }
    info!("Primed {loaded} of {} cache entries", keys.len());
    loaded
}

/// Answers every invalidation with a pull fetch of the same key.
///
/// Runs until the returned handle is aborted. If the task falls behind the
/// change stream it refetches whatever is still stale.
pub fn spawn_refetcher(cache: Arc<MemoryCache>, fetcher: Arc<dyn Fetch>) -> JoinHandle<()> {
    let mut events = cache.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CacheEvent::Invalidated(key)) => {
                    refetch(cache.as_ref(), fetcher.as_ref(), &key).await;
                }
                Ok(CacheEvent::Updated(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Refetcher skipped {skipped} cache events, refetching stale entries");
                    for key in cache.stale_keys() {
                        refetch(cache.as_ref(), fetcher.as_ref(), &key).await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Refetcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use async_trait::async_trait;
    use cache::QueryData;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves a fixed unread count and fails everything else.
    #[derive(Default)]
    struct FakeFetch {
        calls: Mutex<Vec<QueryKey>>,
    }

    impl FakeFetch {
        fn calls(&self) -> Vec<QueryKey> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for FakeFetch {
        async fn fetch(&self, key: &QueryKey) -> Result<QueryData, Error> {
            self.calls.lock().unwrap().push(key.clone());
            match key {
                QueryKey::UnreadNotificationCount => Ok(QueryData::UnreadCount(3)),
                _ => Err(Error {
                    source: None,
                    error_kind: ErrorKind::Status(500),
                }),
            }
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_prime_counts_successful_loads() {
        let cache = MemoryCache::new();
        let fetcher = FakeFetch::default();

        let loaded = prime(
            &cache,
            &fetcher,
            &[QueryKey::Conversations, QueryKey::UnreadNotificationCount],
        )
        .await;

        assert_eq!(loaded, 1);
        assert_eq!(
            cache.get(&QueryKey::UnreadNotificationCount),
            Some(QueryData::UnreadCount(3))
        );
        assert!(cache.get(&QueryKey::Conversations).is_none());
    }

    #[tokio::test]
    async fn test_invalidation_triggers_refetch() {
        let cache = Arc::new(MemoryCache::new());
        cache.set(QueryKey::UnreadNotificationCount, QueryData::UnreadCount(9));
        let fetcher = Arc::new(FakeFetch::default());
        let handle = spawn_refetcher(cache.clone(), fetcher.clone());

        cache.invalidate(&QueryKey::UnreadNotificationCount);

        eventually(|| !cache.is_stale(&QueryKey::UnreadNotificationCount)).await;
        assert_eq!(
            cache.get(&QueryKey::UnreadNotificationCount),
            Some(QueryData::UnreadCount(3))
        );
        assert_eq!(fetcher.calls(), vec![QueryKey::UnreadNotificationCount]);
        handle.abort();
    }

    #[tokio::test]
    async fn test_failed_refetch_leaves_entry_stale() {
        let cache = Arc::new(MemoryCache::new());
        cache.set(QueryKey::Conversations, QueryData::Conversations(vec![]));
        let fetcher = Arc::new(FakeFetch::default());
        let handle = spawn_refetcher(cache.clone(), fetcher.clone());

        cache.invalidate(&QueryKey::Conversations);

        eventually(|| !fetcher.calls().is_empty()).await;
        assert!(cache.is_stale(&QueryKey::Conversations));
        assert_eq!(
            cache.get(&QueryKey::Conversations),
            Some(QueryData::Conversations(vec![]))
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_writes_do_not_trigger_fetches() {
        let cache = Arc::new(MemoryCache::new());
        let fetcher = Arc::new(FakeFetch::default());
        let handle = spawn_refetcher(cache.clone(), fetcher.clone());

        cache.set(QueryKey::UnreadNotificationCount, QueryData::UnreadCount(1));
        cache.invalidate(&QueryKey::UnreadNotificationCount);

        // The invalidation is behind the write, so once it is served the write was skipped.
        eventually(|| !fetcher.calls().is_empty()).await;
        assert_eq!(fetcher.calls(), vec![QueryKey::UnreadNotificationCount]);
        handle.abort();
    }
}
