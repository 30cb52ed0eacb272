//! Notification fan-out from a thing to its message observers.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value as Json;

use crate::message::{Message, actions_topic, event_topic, properties_topic};
use crate::sync::{read, write};

/// Receives every `(topic, message)` a thing publishes.
pub type MessageObserver = Arc<dyn Fn(&str, &Message) + Send + Sync>;

/// Cheap handle publishing on behalf of a single thing.
///
/// Properties and actions keep a clone so they can report their own changes.
/// Observers are called on the publishing thread; they must not block.
#[derive(Clone)]
pub struct Notifier {
    thing_id: Arc<str>,
    observers: Arc<RwLock<Vec<MessageObserver>>>,
}

impl Notifier {
    #[must_use]
    pub fn new(thing_id: &str) -> Self {
        Self {
            thing_id: Arc::from(thing_id),
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn thing_id(&self) -> &str {
        &self.thing_id
    }

    pub fn add_observer(&self, observer: MessageObserver) {
        write(&self.observers).push(observer);
    }

    /// Deliver `message` on `topic` to every observer.
    pub fn publish(&self, topic: &str, message: &Message) {
        let observers = read(&self.observers).clone();
        tracing::debug!(
            topic,
            message_type = message.message_type(),
            observers = observers.len(),
            "publishing message"
        );
        for observer in &observers {
            observer(topic, message);
        }
    }

    pub fn property_notify(&self, name: &str, value: Json) {
        self.publish(
            &properties_topic(&self.thing_id),
            &Message::property_status(name, value),
        );
    }

    pub fn action_notify(&self, name: &str, description: Json) {
        self.publish(
            &actions_topic(&self.thing_id),
            &Message::action_status(name, description),
        );
    }

    pub fn event_notify(&self, name: &str, description: Json) {
        self.publish(
            &event_topic(&self.thing_id, name),
            &Message::event(name, description),
        );
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("thing_id", &self.thing_id)
            .field("observers", &read(&self.observers).len())
            .finish()
    }
}
