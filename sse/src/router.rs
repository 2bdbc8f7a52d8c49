use crate::error::Error;
use events::RawEvent;
use log::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for handling one push event type.
///
/// Handlers run synchronously and to completion. They receive the undecoded
/// payload and are responsible for decoding it.
pub trait EventHandler: Send + Sync {
    fn handle(&self, data: &Value) -> Result<(), Error>;
}

/// What the router did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// No handler is registered for the event type.
    Ignored,
    /// The handler returned an error. It has been logged.
    Failed,
}

/// Dispatch table from event type name to handler.
///
/// Events are handled one at a time on the caller's task, in the order the
/// caller passes them in. Unknown event types are skipped so the server can
/// introduce new types without breaking older clients.
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<HashMap<String, Arc<dyn EventHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event_type`, replacing any previous one.
    /// Note: This creates a new router instance with the additional handler.
    pub fn with_handler(mut self, event_type: &str, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.insert(event_type.to_string(), handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn dispatch(&self, event: &RawEvent) -> Dispatch {
        let Some(handler) = self.handlers.get(&event.event_type) else {
            debug!("Ignoring push event of unknown type '{}'", event.event_type);
            return Dispatch::Ignored;
        };

        trace!("Dispatching push event '{}'", event.event_type);
        match handler.handle(&event.data) {
            Ok(()) => Dispatch::Handled,
            Err(e) => {
                error!("Handler for push event '{}' failed: {e}", event.event_type);
                Dispatch::Failed
            }
        }
    }
}
