//! Merges push events into cached pull-fetch results.
//!
//! Two rules make push events and pull fetches commute, whatever order they
//! land in:
//!
//! - merges are keyed by identifier, so re-applying an event is a no-op
//! - entries are only mutated if a pull fetch already created them; otherwise
//!   a refetch is requested through [`cache::QueryCache::invalidate`]

pub mod message;
pub mod notification;

#[cfg(test)]
pub(crate) mod fixtures;

pub use message::{ListOutcome, MessageOutcome, MessageReconciler};
pub use notification::{NotificationOutcome, NotificationReconciler};

use crate::router::EventRouter;
use cache::QueryCache;
use events::{Id, MESSAGE_ARRIVED, NOTIFICATION_ARRIVED};
use std::sync::Arc;

/// Builds the dispatch table for one signed-in user.
///
/// The user id is baked into the message handler because unread counters
/// depend on who the current identity is.
pub fn router_for(cache: Arc<dyn QueryCache>, current_user: &Id) -> EventRouter {
    EventRouter::new()
        .with_handler(
            MESSAGE_ARRIVED,
            Arc::new(MessageReconciler::new(cache.clone(), current_user.clone())),
        )
        .with_handler(
            NOTIFICATION_ARRIVED,
            Arc::new(NotificationReconciler::new(cache)),
        )
}
