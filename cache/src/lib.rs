//! Local query cache for pull-fetched data.
//!
//! Every pull fetch made by the client lands in a named, parameterized entry
//! (a [`QueryKey`]). The real-time layer reconciles push events into these
//! same entries, so both update paths meet here.
//!
//! # Architecture
//!
//! - **Typed keys and data**: [`QueryKey`] names an entry, [`QueryData`] holds
//!   its value. A key always maps to the matching data variant.
//! - **Narrow port**: [`QueryCache`] is the only surface the reconciler sees
//!   (read-if-present, write-replace, invalidate, locate, mutate-if-present),
//!   plus the change stream and a reset for identity switches.
//! - **In-memory implementation**: [`MemoryCache`] stores entries in a
//!   `DashMap` and broadcasts every write and invalidation.
//! - **Subscriber surface**: [`QuerySubscription`] lets consumers follow one
//!   entry and re-read it whenever it changes.
//!
//! # Modules
//!
//! - `key`: query keys and the filters used to locate parameterized entries
//! - `data`: cached values (message pages, conversation list, notifications, counts)
//! - `memory`: `MemoryCache` and its change events
//! - `subscription`: per-entry subscriptions for consumers

pub mod data;
pub mod key;
pub mod memory;
pub mod subscription;

pub use data::{ConversationSummary, MessagePage, NotificationPage, Participant, QueryData};
pub use key::{NotificationFilter, QueryFilter, QueryKey};
pub use memory::{CacheEvent, MemoryCache};
pub use subscription::{QueryState, QuerySubscription};

use tokio::sync::broadcast;

/// The cache operations the real-time layer depends on.
///
/// Implementations must apply `update` and `update_or_insert` atomically with
/// respect to `set` on the same key, so a pull fetch landing concurrently with
/// a push event is never half-applied.
pub trait QueryCache: Send + Sync {
    /// Returns a copy of the entry, if a pull fetch has populated it.
    fn get(&self, key: &QueryKey) -> Option<QueryData>;

    /// Replaces (or creates) the entry.
    fn set(&self, key: QueryKey, data: QueryData);

    /// Marks the entry stale and requests a refetch. Valid for absent keys too:
    /// the request still reaches whoever performs pull fetches.
    fn invalidate(&self, key: &QueryKey);

    /// Lists the keys of all present entries that match `filter`.
    fn keys(&self, filter: &QueryFilter) -> Vec<QueryKey>;

    /// Mutates the entry in place if present. Returns `false` when absent.
    fn update(&self, key: &QueryKey, apply: &mut dyn FnMut(&mut QueryData)) -> bool;

    /// Mutates the entry in place, or stores `insert` if it is absent.
    fn update_or_insert(
        &self,
        key: QueryKey,
        insert: QueryData,
        apply: &mut dyn FnMut(&mut QueryData),
    );

    /// Drops every entry. Used when the signed-in user changes, since no
    /// entry fetched for one user may be shown to or merged for another.
    fn clear(&self);

    /// Stream of every write and invalidation made after the call.
    fn events(&self) -> broadcast::Receiver<CacheEvent>;
}
