//! Model events.
//!
//! Instances publish events to their own subscribers and to the subscribers
//! of their factory. Subscribers receive events over `mpsc` channels and may
//! filter on one attribute.
//!
//! # Usage
//!
//! ```rust
//! use wrangler_core::{Attribute, ModelEvent, Schema, Value, Wrangler};
//!
//! let db = Wrangler::open_in_memory().unwrap();
//! let schema = Schema::new().with(Attribute::new("name")).unwrap();
//! let users = db.factory("user", schema).unwrap();
//!
//! let user = users.create(&Default::default()).unwrap();
//! let names = user.subscribe_attribute("name");
//! user.set("name", Value::from("ada")).unwrap();
//!
//! match names.try_recv().unwrap() {
//!     ModelEvent::Change { key, value, .. } => {
//!         assert_eq!(key, "name");
//!         assert_eq!(value, Value::from("ada"));
//!     }
//!     other => panic!("unexpected event {other:?}"),
//! }
//! ```

use crate::id::ModelId;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// An event published by a model instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// An attribute was populated by `create`.
    Added {
        /// Instance id.
        id: ModelId,
        /// Attribute name.
        key: String,
        /// Initial value.
        value: Value,
    },
    /// An attribute changed.
    Change {
        /// Instance id.
        id: ModelId,
        /// Attribute name.
        key: String,
        /// New value.
        value: Value,
    },
    /// The instance was saved.
    Saved {
        /// Instance id.
        id: ModelId,
    },
    /// The instance was removed.
    Removed {
        /// Instance id.
        id: ModelId,
    },
}

impl ModelEvent {
    /// Returns the id of the instance that published the event.
    #[must_use]
    pub fn id(&self) -> &ModelId {
        match self {
            Self::Added { id, .. }
            | Self::Change { id, .. }
            | Self::Saved { id }
            | Self::Removed { id } => id,
        }
    }

    /// Returns the attribute the event is about, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Added { key, .. } | Self::Change { key, .. } => Some(key),
            Self::Saved { .. } | Self::Removed { .. } => None,
        }
    }
}

struct Subscriber {
    attribute: Option<String>,
    sender: Sender<ModelEvent>,
}

impl Subscriber {
    fn wants(&self, event: &ModelEvent) -> bool {
        match &self.attribute {
            None => true,
            Some(attr) => event.key() == Some(attr.as_str()),
        }
    }
}

/// Fan-out of events to channel subscribers.
///
/// Subscribers whose receiver has been dropped are pruned on the next emit.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every event.
    pub fn subscribe(&self) -> Receiver<ModelEvent> {
        self.add(None)
    }

    /// Subscribes to `Added` and `Change` events of one attribute.
    pub fn subscribe_attribute(&self, key: impl Into<String>) -> Receiver<ModelEvent> {
        self.add(Some(key.into()))
    }

    /// Delivers an event to every interested subscriber.
    pub fn emit(&self, event: &ModelEvent) {
        self.subscribers
            .lock()
            .retain(|s| !s.wants(event) || s.sender.send(event.clone()).is_ok());
    }

    /// Returns the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn add(&self, attribute: Option<String>) -> Receiver<ModelEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().push(Subscriber { attribute, sender });
        receiver
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(key: &str) -> ModelEvent {
        ModelEvent::Change {
            id: ModelId::from("1"),
            key: key.to_string(),
            value: Value::from(1),
        }
    }

    #[test]
    fn all_subscriber_sees_everything() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(&change("a"));
        bus.emit(&ModelEvent::Saved { id: ModelId::from("1") });

        assert_eq!(rx.try_recv().unwrap().key(), Some("a"));
        assert!(matches!(rx.try_recv().unwrap(), ModelEvent::Saved { .. }));
    }

    #[test]
    fn attribute_filter() {
        let bus = EventBus::new();
        let rx = bus.subscribe_attribute("b");
        bus.emit(&change("a"));
        bus.emit(&change("b"));
        bus.emit(&ModelEvent::Removed { id: ModelId::from("1") });

        assert_eq!(rx.try_recv().unwrap().key(), Some("b"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _kept = bus.subscribe_attribute("x");
        drop(rx);

        bus.emit(&change("a"));
        assert_eq!(bus.subscriber_count(), 1);
    }
}
