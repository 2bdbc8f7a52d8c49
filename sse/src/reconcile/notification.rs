use crate::error::Error;
use crate::router::EventHandler;
use cache::{NotificationPage, QueryCache, QueryData, QueryFilter, QueryKey};
use events::Notification;
use log::*;
use serde_json::Value;
use std::sync::Arc;

/// Summary of one notification reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub lists_updated: usize,
    pub lists_unchanged: usize,
}

/// Puts `notification` at the head of a cached page, then trims the page back
/// to its declared limit. A page that already holds the id is left alone.
/// Returns `true` if the page changed.
pub fn prepend_notification(page: &mut NotificationPage, notification: &Notification) -> bool {
    if page.contains(&notification.id) {
        return false;
    }
    page.notifications.insert(0, notification.clone());
    if let Some(limit) = page.limit {
        page.notifications.truncate(limit);
    }
    if let Some(total) = page.total.as_mut() {
        *total += 1;
    }
    true
}

/// Handles `notification_arrived`.
pub struct NotificationReconciler {
    cache: Arc<dyn QueryCache>,
}

impl NotificationReconciler {
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self { cache }
    }

    pub fn reconcile(&self, notification: &Notification) -> NotificationOutcome {
        // Pushed notifications are unread, whatever the payload says.
        let notification = Notification {
            is_read: false,
            ..notification.clone()
        };

        self.increment_unread_count();

        let mut lists_updated = 0;
        let mut lists_unchanged = 0;
        for key in self
            .cache
            .keys(&QueryFilter::NotificationLists { is_read: false })
        {
            self.cache.update(&key, &mut |data: &mut QueryData| match data {
                QueryData::Notifications(page) => {
                    if prepend_notification(page, &notification) {
                        lists_updated += 1;
                    } else {
                        lists_unchanged += 1;
                    }
                }
                other => warn!("Entry {key} holds {} instead of notifications", other.kind()),
            });
        }

        debug!(
            "Reconciled notification {}: {} list(s) updated, {} unchanged",
            notification.id, lists_updated, lists_unchanged
        );

        NotificationOutcome {
            lists_updated,
            lists_unchanged,
        }
    }

    fn increment_unread_count(&self) {
        self.cache.update_or_insert(
            QueryKey::UnreadNotificationCount,
            QueryData::UnreadCount(1),
            &mut |data: &mut QueryData| match data {
                QueryData::UnreadCount(count) => *count += 1,
                other => {
                    warn!("Unread count entry holds {}, resetting", other.kind());
                    *other = QueryData::UnreadCount(1);
                }
            },
        );
    }
}

impl EventHandler for NotificationReconciler {
    fn handle(&self, data: &Value) -> Result<(), Error> {
        let notification: Notification = serde_json::from_value(data.clone())?;
        self.reconcile(&notification);
        Ok(())
    }
}
