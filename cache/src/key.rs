use events::Id;
use std::fmt;

/// Identity of a cached pull-fetch result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// One page of messages for a conversation.
    Messages {
        conversation_id: Id,
        page: u32,
        limit: u32,
    },
    /// The current user's conversations, most recent activity first.
    Conversations,
    /// One page of the current user's notifications.
    Notifications {
        filter: NotificationFilter,
        page: u32,
        limit: u32,
    },
    /// Scalar count of unread notifications.
    UnreadNotificationCount,
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryKey::Messages {
                conversation_id,
                page,
                limit,
            } => write!(f, "messages[{conversation_id}, page={page}, limit={limit}]"),
            QueryKey::Conversations => write!(f, "conversations"),
            QueryKey::Notifications {
                filter,
                page,
                limit,
            } => write!(f, "notifications[{filter}, page={page}, limit={limit}]"),
            QueryKey::UnreadNotificationCount => write!(f, "notifications.unread_count"),
        }
    }
}

/// Read-state filter of a notification list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationFilter {
    All,
    Unread,
    Read,
}

impl NotificationFilter {
    /// Whether a notification with the given read flag belongs in this view.
    pub fn accepts(&self, is_read: bool) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Unread => !is_read,
            NotificationFilter::Read => is_read,
        }
    }

    /// Query-string value understood by the notifications endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationFilter::All => "all",
            NotificationFilter::Unread => "unread",
            NotificationFilter::Read => "read",
        }
    }
}

impl fmt::Display for NotificationFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects a family of parameterized entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// Exactly one key.
    Exact(QueryKey),
    /// Every message page of one conversation, whatever its window.
    MessagesFor(Id),
    /// Every notification list view that would contain a notification with
    /// this read flag.
    NotificationLists { is_read: bool },
    /// Everything in the cache.
    All,
}

impl QueryFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match (self, key) {
            (QueryFilter::All, _) => true,
            (QueryFilter::Exact(expected), key) => expected == key,
            (
                QueryFilter::MessagesFor(id),
                QueryKey::Messages {
                    conversation_id, ..
                },
            ) => id == conversation_id,
            (QueryFilter::NotificationLists { is_read }, QueryKey::Notifications { filter, .. }) => {
                filter.accepts(*is_read)
            }
            _ => false,
        }
    }
}
