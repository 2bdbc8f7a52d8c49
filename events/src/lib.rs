//! Push event records for the e-learning platform's real-time channel.
//!
//! This crate defines what the server pushes to a connected client: the
//! records carried by each event and the event type names used to route them.
//! It has no dependencies on internal crates so that both the cache and the
//! push layer can share these types without cycles.
//!
//! # Event types
//!
//! - `message_arrived`: a new chat message in one of the user's conversations.
//!   Payload: `{ "message": { "id", "conversationId", "senderId", "content", "createdAt" } }`
//! - `notification_arrived`: a new notification for the user. Payload: the full
//!   notification record, unread by construction.
//!
//! Any other event type is a future extension and must be tolerated by
//! consumers (see `sse::router`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier type shared by users, conversations, messages and notifications.
/// The server hands out opaque string ids.
pub type Id = String;

/// Event type name for a newly created chat message.
pub const MESSAGE_ARRIVED: &str = "message_arrived";

/// Event type name for a newly created notification.
pub const NOTIFICATION_ARRIVED: &str = "notification_arrived";

/// Trait for getting the push event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// A chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Id,
    pub conversation_id: Id,
    pub sender_id: Id,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Payload of a `message_arrived` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageArrived {
    pub message: Message,
}

/// A user notification as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id,
    /// Free-form category such as "achievement" or "ticket_reply".
    #[serde(default, rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub link: Option<String>,
    /// Pushed notifications are always unread; the field exists so the same
    /// record can be used for pulled lists.
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// An event as it comes off the wire: a type name plus an undecoded JSON payload.
///
/// Decoding is left to the handler registered for `event_type` so that unknown
/// types never need to be understood, only skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event_type: String,
    pub data: Value,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Typed view of every push event this client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    MessageArrived(MessageArrived),
    NotificationArrived(Notification),
}

impl EventType for PushEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PushEvent::MessageArrived(_) => MESSAGE_ARRIVED,
            PushEvent::NotificationArrived(_) => NOTIFICATION_ARRIVED,
        }
    }
}

impl PushEvent {
    /// Encodes the event the way the server sends it.
    pub fn to_raw(&self) -> Result<RawEvent, serde_json::Error> {
        let data = match self {
            PushEvent::MessageArrived(payload) => serde_json::to_value(payload)?,
            PushEvent::NotificationArrived(notification) => serde_json::to_value(notification)?,
        };
        Ok(RawEvent::new(self.event_type(), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_message_arrived_payload_decodes_from_camel_case() {
        let data = json!({
            "message": {
                "id": "m1",
                "conversationId": "c1",
                "senderId": "u2",
                "content": "hello",
                "createdAt": "2024-05-01T10:00:00Z"
            }
        });

        let payload: MessageArrived = serde_json::from_value(data).unwrap();

        assert_eq!(payload.message.id, "m1");
        assert_eq!(payload.message.conversation_id, "c1");
        assert_eq!(payload.message.sender_id, "u2");
        assert_eq!(
            payload.message.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_notification_defaults_optional_fields() {
        let data = json!({
            "id": "n1",
            "title": "Course completed",
            "createdAt": "2024-05-01T10:00:00Z"
        });

        let notification: Notification = serde_json::from_value(data).unwrap();

        assert_eq!(notification.kind, "");
        assert_eq!(notification.body, "");
        assert_eq!(notification.link, None);
        assert!(!notification.is_read);
    }

    #[test]
    fn test_notification_kind_uses_type_field() {
        let data = json!({
            "id": "n2",
            "type": "achievement",
            "title": "Badge unlocked",
            "createdAt": "2024-05-01T10:00:00Z"
        });

        let notification: Notification = serde_json::from_value(data).unwrap();

        assert_eq!(notification.kind, "achievement");
    }

    #[test]
    fn test_to_raw_uses_event_type_names() {
        let message = Message {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "u2".to_string(),
            content: "hi".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        };
        let raw = PushEvent::MessageArrived(MessageArrived { message })
            .to_raw()
            .unwrap();

        assert_eq!(raw.event_type, MESSAGE_ARRIVED);
        assert_eq!(raw.data["message"]["conversationId"], "c1");
    }
}
