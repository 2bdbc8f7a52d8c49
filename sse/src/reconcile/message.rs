use crate::error::Error;
use crate::router::EventHandler;
use cache::{ConversationSummary, MessagePage, QueryCache, QueryData, QueryFilter, QueryKey};
use events::{Id, Message, MessageArrived};
use log::*;
use serde_json::Value;
use std::sync::Arc;

/// What happened to the conversation list for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOutcome {
    /// Snapshot replaced and conversation moved to the front.
    Moved,
    /// The conversation already shows this message; nothing to do.
    AlreadyCurrent,
    /// The conversation already shows a newer message, so this one is a late
    /// redelivery; nothing to do.
    Outdated,
    /// No list cached; a refetch was requested.
    MissingList,
    /// The conversation is not in the cached list; a refetch was requested.
    MissingConversation,
}

/// Summary of one message reconciliation, mostly for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub pages_appended: usize,
    pub pages_unchanged: usize,
    pub conversation_list: ListOutcome,
}

/// Appends `message` to a cached page unless the page already holds its id.
/// Returns `true` if the page changed.
pub fn append_message(page: &mut MessagePage, message: &Message) -> bool {
    if page.contains(&message.id) {
        return false;
    }
    page.messages.push(message.clone());
    if let Some(total) = page.total.as_mut() {
        *total += 1;
    }
    true
}

/// Records `message` as the latest activity of its conversation and moves that
/// conversation to the front, keeping every other entry in place.
///
/// The unread counter grows only for messages from someone other than
/// `current_user`. A conversation whose last message is already `message`
/// (redelivery, or a pull fetch that got there first) is left untouched, and
/// so is one whose last message is newer than `message`.
pub fn touch_conversation(
    conversations: &mut Vec<ConversationSummary>,
    message: &Message,
    current_user: &str,
) -> ListOutcome {
    let Some(index) = conversations
        .iter()
        .position(|c| c.id == message.conversation_id)
    else {
        return ListOutcome::MissingConversation;
    };

    if let Some(last) = conversations[index].last_message.as_ref() {
        if last.id == message.id {
            return ListOutcome::AlreadyCurrent;
        }
        if last.created_at > message.created_at {
            return ListOutcome::Outdated;
        }
    }

    let mut conversation = conversations.remove(index);
    conversation.last_message = Some(message.clone());
    conversation.updated_at = message.created_at;
    if message.sender_id != current_user {
        conversation.unread_count = conversation.unread_count.saturating_add(1);
    }
    conversations.insert(0, conversation);

    ListOutcome::Moved
}

/// Handles `message_arrived` for one signed-in user.
pub struct MessageReconciler {
    cache: Arc<dyn QueryCache>,
    current_user: Id,
}

impl MessageReconciler {
    pub fn new(cache: Arc<dyn QueryCache>, current_user: Id) -> Self {
        Self {
            cache,
            current_user,
        }
    }

    pub fn reconcile(&self, message: &Message) -> MessageOutcome {
        let (pages_appended, pages_unchanged) = self.merge_into_pages(message);
        let conversation_list = self.merge_into_list(message);

        debug!(
            "Reconciled message {} in conversation {}: {} page(s) appended, {} unchanged, list {:?}",
            message.id, message.conversation_id, pages_appended, pages_unchanged, conversation_list
        );

        MessageOutcome {
            pages_appended,
            pages_unchanged,
            conversation_list,
        }
    }

    fn merge_into_pages(&self, message: &Message) -> (usize, usize) {
        let mut appended = 0;
        let mut unchanged = 0;

        let keys = self
            .cache
            .keys(&QueryFilter::MessagesFor(message.conversation_id.clone()));

        for key in keys {
            // The entry may have been evicted since `keys`; that is fine.
            self.cache.update(&key, &mut |data: &mut QueryData| match data {
                QueryData::Messages(page) => {
                    if append_message(page, message) {
                        appended += 1;
                    } else {
                        unchanged += 1;
                    }
                }
                other => warn!("Entry {key} holds {} instead of messages", other.kind()),
            });
        }

        (appended, unchanged)
    }

    fn merge_into_list(&self, message: &Message) -> ListOutcome {
        let mut outcome = ListOutcome::MissingList;

        let present = self
            .cache
            .update(&QueryKey::Conversations, &mut |data: &mut QueryData| {
                outcome = match data {
                    QueryData::Conversations(conversations) => {
                        touch_conversation(conversations, message, &self.current_user)
                    }
                    other => {
                        warn!("Conversation list entry holds {}", other.kind());
                        ListOutcome::MissingList
                    }
                };
            });

        if !present || outcome == ListOutcome::MissingList {
            debug!("No usable conversation list cached, requesting refetch");
            self.cache.invalidate(&QueryKey::Conversations);
            return ListOutcome::MissingList;
        }

        if outcome == ListOutcome::MissingConversation {
            debug!(
                "Conversation {} not in cached list, requesting refetch",
                message.conversation_id
            );
            self.cache.invalidate(&QueryKey::Conversations);
        }

        outcome
    }
}

impl EventHandler for MessageReconciler {
    fn handle(&self, data: &Value) -> Result<(), Error> {
        let payload: MessageArrived = serde_json::from_value(data.clone())?;
        self.reconcile(&payload.message);
        Ok(())
    }
}
