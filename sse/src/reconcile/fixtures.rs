//! Builders shared by the reconciler tests.

use cache::{ConversationSummary, NotificationFilter, QueryKey};
use chrono::{DateTime, TimeZone, Utc};
use events::{Message, Notification};

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

pub fn message(id: &str, conversation_id: &str, sender_id: &str) -> Message {
    message_at(id, conversation_id, sender_id, 30)
}

pub fn message_at(id: &str, conversation_id: &str, sender_id: &str, minute: u32) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content: format!("content of {id}"),
        created_at: at(minute),
    }
}

pub fn conversation(id: &str, unread_count: u32) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        participants: vec![],
        last_message: None,
        updated_at: at(0),
        unread_count,
    }
}

pub fn conversation_ids(list: &[ConversationSummary]) -> Vec<&str> {
    list.iter().map(|c| c.id.as_str()).collect()
}

pub fn messages_key(conversation_id: &str, page: u32) -> QueryKey {
    QueryKey::Messages {
        conversation_id: conversation_id.to_string(),
        page,
        limit: 50,
    }
}

pub fn notification(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        kind: "achievement".to_string(),
        title: format!("title of {id}"),
        body: String::new(),
        link: None,
        is_read: false,
        created_at: at(45),
    }
}

pub fn notifications_key(filter: NotificationFilter, limit: u32) -> QueryKey {
    QueryKey::Notifications {
        filter,
        page: 1,
        limit,
    }
}
