//! Routing of received messages to game-registered handlers.

use crate::messages::{Message, MessageKind};
use log::{debug, info};
use std::collections::HashMap;

/// Maps message kinds to at most one handler each.
///
/// Registering a handler for a kind replaces any previous one. Dispatch runs
/// exclusively on the game thread, inside the handler's poll step; I/O tasks
/// never call into it. Handlers must be non-blocking.
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: HashMap<MessageKind, Box<dyn FnMut(Message) + Send>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        MessageDispatcher {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `kind`, replacing any existing handler.
    pub fn register_handler<F>(&mut self, kind: MessageKind, handler: F)
    where
        F: FnMut(Message) + Send + 'static,
    {
        if self.handlers.insert(kind, Box::new(handler)).is_some() {
            debug!("Replaced handler for message kind {kind:?}");
        } else {
            debug!("Registered handler for message kind {kind:?}");
        }
    }

    /// Removes the handler for `kind`. Returns whether one was registered.
    pub fn unregister_handler(&mut self, kind: MessageKind) -> bool {
        self.handlers.remove(&kind).is_some()
    }

    /// Delivers `message` to its handler, or logs and drops it.
    pub fn dispatch(&mut self, message: Message) {
        let kind = message.kind();
        match self.handlers.get_mut(&kind) {
            Some(handler) => handler(message),
            None => info!("No handler registered for message kind {kind:?}; dropping"),
        }
    }

    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispatch_routes_to_registered_handler() {
        let mut dispatcher = MessageDispatcher::new();
        let hits = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&hits);
        dispatcher.register_handler(MessageKind::GameOver, move |message| {
            assert_eq!(message, Message::GameOver);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(Message::GameOver);
        dispatcher.dispatch(Message::GameOver);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unhandled_kind_is_dropped() {
        let mut dispatcher = MessageDispatcher::new();
        // Must not panic or misroute.
        dispatcher.dispatch(Message::ConnectAck { client_id: 1 });
        assert!(!dispatcher.has_handler(MessageKind::ConnectAck));
    }

    #[test]
    fn test_registration_replaces_previous_handler() {
        let mut dispatcher = MessageDispatcher::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&first);
        dispatcher.register_handler(MessageKind::GameOver, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        dispatcher.register_handler(MessageKind::GameOver, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(Message::GameOver);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_handler() {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register_handler(MessageKind::GameOver, |_| {});

        assert!(dispatcher.unregister_handler(MessageKind::GameOver));
        assert!(!dispatcher.unregister_handler(MessageKind::GameOver));
        dispatcher.dispatch(Message::GameOver);
    }
}
