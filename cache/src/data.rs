use chrono::{DateTime, Utc};
use events::{Id, Message, Notification};
use serde::{Deserialize, Serialize};

/// Value stored under a [`crate::QueryKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Messages(MessagePage),
    Conversations(Vec<ConversationSummary>),
    Notifications(NotificationPage),
    UnreadCount(u64),
}

impl QueryData {
    /// Short variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryData::Messages(_) => "messages",
            QueryData::Conversations(_) => "conversations",
            QueryData::Notifications(_) => "notifications",
            QueryData::UnreadCount(_) => "unread_count",
        }
    }
}

/// One window of a conversation's messages, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Total number of messages in the conversation, when the server reports it.
    #[serde(default)]
    pub total: Option<u64>,
}

impl MessagePage {
    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }
}

/// Other member of a conversation, as shown in the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Entry of the conversation list, denormalized for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Id,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<Message>,
    pub updated_at: DateTime<Utc>,
    /// Unread messages for the current user only.
    #[serde(default)]
    pub unread_count: u32,
}

/// One page of notifications, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    /// Page size the page was fetched with. Pushed notifications never grow
    /// the page beyond it.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl NotificationPage {
    pub fn contains(&self, notification_id: &str) -> bool {
        self.notifications.iter().any(|n| n.id == notification_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_summary_decodes_without_optional_fields() {
        let summary: ConversationSummary = serde_json::from_value(json!({
            "id": "c1",
            "updatedAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert!(summary.participants.is_empty());
        assert_eq!(summary.last_message, None);
        assert_eq!(summary.unread_count, 0);
    }

    #[test]
    fn test_notification_page_limit_is_optional() {
        let page: NotificationPage = serde_json::from_value(json!({
            "notifications": [],
            "total": 3
        }))
        .unwrap();

        assert_eq!(page.limit, None);
        assert_eq!(page.total, Some(3));
    }
}
