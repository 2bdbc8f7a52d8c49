use crate::subscription::{QueryState, QuerySubscription};
use crate::{QueryCache, QueryData, QueryFilter, QueryKey};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::*;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of the change broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Change notification emitted after every write or invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// The entry was created, replaced or mutated in place.
    Updated(QueryKey),
    /// A refetch of the entry was requested. The entry may not exist.
    Invalidated(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated(key) | CacheEvent::Invalidated(key) => key,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    data: QueryData,
    stale: bool,
    updated_at: DateTime<Utc>,
}

impl CachedEntry {
    fn fresh(data: QueryData) -> Self {
        Self {
            data,
            stale: false,
            updated_at: Utc::now(),
        }
    }
}

/// In-memory [`QueryCache`] that lives for one client session.
///
/// Per-key mutations run under the `DashMap` shard lock, so `update` never
/// interleaves with a concurrent `set` of the same key. Change events are sent
/// after the lock is released.
pub struct MemoryCache {
    entries: DashMap<QueryKey, CachedEntry>,
    events: broadcast::Sender<CacheEvent>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: DashMap::new(),
            events,
        }
    }

    /// Follows a single entry. See [`QuerySubscription`].
    pub fn subscribe(self: &Arc<Self>, key: QueryKey) -> QuerySubscription {
        QuerySubscription::new(key, Arc::clone(self), self.events.subscribe())
    }

    /// Current value and staleness of an entry.
    pub fn state(&self, key: &QueryKey) -> QueryState {
        match self.entries.get(key) {
            Some(entry) => QueryState {
                data: Some(entry.data.clone()),
                stale: entry.stale,
            },
            None => QueryState {
                data: None,
                stale: false,
            },
        }
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|e| e.stale).unwrap_or(false)
    }

    /// When the entry was last written, by either update path.
    pub fn updated_at(&self, key: &QueryKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.updated_at)
    }

    /// Keys that were invalidated and not refetched since.
    pub fn stale_keys(&self) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|e| e.stale)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&self, event: CacheEvent) {
        // No receivers is normal before anyone subscribes.
        if self.events.send(event).is_err() {
            trace!("No cache subscribers for change event");
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache for MemoryCache {
    fn get(&self, key: &QueryKey) -> Option<QueryData> {
        self.entries.get(key).map(|e| e.data.clone())
    }

    fn set(&self, key: QueryKey, data: QueryData) {
        trace!("Cache set {key} ({})", data.kind());
        self.entries.insert(key.clone(), CachedEntry::fresh(data));
        self.notify(CacheEvent::Updated(key));
    }

    fn invalidate(&self, key: &QueryKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.stale = true;
        }
        debug!("Cache invalidate {key}");
        self.notify(CacheEvent::Invalidated(key.clone()));
    }

    fn keys(&self, filter: &QueryFilter) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|e| filter.matches(e.key()))
            .map(|e| e.key().clone())
            .collect()
    }

    fn update(&self, key: &QueryKey, apply: &mut dyn FnMut(&mut QueryData)) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                apply(&mut entry.data);
                entry.updated_at = Utc::now();
                drop(entry); // Release shard lock before notifying
                self.notify(CacheEvent::Updated(key.clone()));
                true
            }
            None => false,
        }
    }

    fn update_or_insert(
        &self,
        key: QueryKey,
        insert: QueryData,
        apply: &mut dyn FnMut(&mut QueryData),
    ) {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                apply(&mut entry.data);
                entry.updated_at = Utc::now();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedEntry::fresh(insert));
            }
        }
        self.notify(CacheEvent::Updated(key));
    }

    fn clear(&self) {
        let keys: Vec<QueryKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        self.entries.clear();
        debug!("Cache cleared {} entr(ies)", keys.len());
        for key in keys {
            self.notify(CacheEvent::Updated(key));
        }
    }

    fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }
}
