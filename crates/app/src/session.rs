//! Subscriber session: the transport-independent half of a thing's
//! WebSocket endpoint.
//!
//! A session follows the `properties` and `actions` topics of its thing from
//! the moment it is opened. Clients send JSON messages of the form
//! `{"messageType": ..., "data": {...}}`:
//!
//! - `addEventSubscription`: `{"<event>": {}}`, follow those event topics
//! - `setProperty`: `{"<property>": <value>}`, write through the thing
//! - `requestAction`: `{"<action>": {"input"?: ...}}`, accept and start
//!
//! Anything else is answered with an `error` message.

use std::sync::Arc;

use serde_json::{Map, Value as Json};

use webthing_domain::message::{Message, actions_topic, event_topic, properties_topic};
use webthing_domain::property::PropertyValue;
use webthing_domain::thing::Thing;

use crate::action_runner::ActionRunner;
use crate::message_bus::{InProcessMessageBus, Subscription};
use crate::ports::TopicMessage;

/// One client's view of a thing.
#[derive(Debug)]
pub struct ThingSession {
    thing: Arc<Thing>,
    subscription: Subscription,
    runner: ActionRunner,
}

impl ThingSession {
    /// Open a session following the thing's properties and actions.
    #[must_use]
    pub fn open(thing: Arc<Thing>, bus: &InProcessMessageBus, runner: ActionRunner) -> Self {
        let mut subscription = bus.subscribe();
        subscription.subscribe(properties_topic(thing.id()));
        subscription.subscribe(actions_topic(thing.id()));
        tracing::debug!(thing = thing.id(), "session opened");
        Self {
            thing,
            subscription,
            runner,
        }
    }

    #[must_use]
    pub fn thing(&self) -> &Arc<Thing> {
        &self.thing
    }

    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Handle one inbound text frame. Returns the error replies for this
    /// client; an empty list means the request was accepted.
    pub fn handle_text(&mut self, text: &str) -> Vec<Message> {
        let Ok(request) = serde_json::from_str::<Json>(text) else {
            tracing::warn!(thing = self.thing.id(), "unparsable session message");
            return vec![Message::bad_request("Parsing request failed", None)];
        };

        let (Some(message_type), Some(data)) = (
            request.get("messageType").and_then(Json::as_str),
            request.get("data").and_then(Json::as_object),
        ) else {
            tracing::warn!(thing = self.thing.id(), "session message without type or data");
            return vec![Message::bad_request("Invalid message", None)];
        };

        match message_type {
            "addEventSubscription" => {
                self.add_event_subscriptions(data);
                Vec::new()
            }
            "setProperty" => self.set_properties(data),
            "requestAction" => {
                self.request_actions(data);
                Vec::new()
            }
            other => {
                tracing::warn!(thing = self.thing.id(), message_type = other, "unknown message type");
                vec![Message::bad_request(
                    format!("Unknown messageType: {other}"),
                    Some(Json::String(text.to_string())),
                )]
            }
        }
    }

    fn add_event_subscriptions(&mut self, data: &Map<String, Json>) {
        for name in data.keys() {
            self.subscription.subscribe(event_topic(self.thing.id(), name));
        }
    }

    fn set_properties(&self, data: &Map<String, Json>) -> Vec<Message> {
        data.iter()
            .filter_map(|(name, value)| {
                self.thing
                    .set_property(name, PropertyValue::from(value.clone()))
                    .err()
            })
            .map(|err| Message::bad_request(err.to_string(), None))
            .collect()
    }

    fn request_actions(&self, data: &Map<String, Json>) {
        for (name, body) in data {
            let input = body.get("input").cloned();
            if let Some(action) = self.thing.perform_action(name, input) {
                drop(self.runner.spawn(action));
            }
        }
    }

    /// Wait for the next message this session follows.
    pub async fn next_message(&mut self) -> Option<Arc<TopicMessage>> {
        self.subscription.recv().await
    }

    /// The next already-queued message, if any.
    pub fn try_next_message(&mut self) -> Option<Arc<TopicMessage>> {
        self.subscription.try_recv()
    }

    /// Stop following every topic of this thing.
    pub fn close(mut self) {
        let id = self.thing.id().to_string();
        self.subscription.unsubscribe(&properties_topic(&id));
        self.subscription.unsubscribe(&actions_topic(&id));
        self.subscription.unsubscribe_prefix(&format!("{id}/events/"));
        tracing::debug!(thing = %id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webthing_domain::action::{Action, CancellationToken};
    use webthing_domain::value::Value;

    fn setup() -> (Arc<Thing>, InProcessMessageBus) {
        let thing = Thing::builder().id("lamp").build();
        thing
            .link_property("on", Value::new(false), json!({"type": "boolean"}))
            .unwrap();
        thing
            .link_property("level", Value::new(5_i64), json!({"readOnly": true}))
            .unwrap();
        thing
            .link_action("fade", json!({}), |_: &Action, _: &CancellationToken| {})
            .unwrap();
        thing.link_event("overheated", json!({})).unwrap();
        let bus = InProcessMessageBus::new(64);
        bus.attach(&thing);
        (thing, bus)
    }

    fn error_message(reply: &Message) -> &str {
        match reply {
            Message::Error(data) => &data.message,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_follow_properties_and_actions_on_open() {
        let (thing, bus) = setup();
        let session = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());
        assert!(session.subscription().is_subscribed("lamp/properties"));
        assert!(session.subscription().is_subscribed("lamp/actions"));
        assert!(!session.subscription().is_subscribed("lamp/events/overheated"));
    }

    #[tokio::test]
    async fn should_reject_unparsable_text() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(thing, &bus, ActionRunner::current());

        let replies = session.handle_text("{not json");

        assert_eq!(
            serde_json::to_value(&replies[0]).unwrap(),
            json!({"messageType": "error", "data": {
                "status": "400 Bad Request",
                "message": "Parsing request failed"
            }})
        );
    }

    #[tokio::test]
    async fn should_reject_message_without_data() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(thing, &bus, ActionRunner::current());

        let replies = session.handle_text(r#"{"messageType": "setProperty"}"#);

        assert_eq!(error_message(&replies[0]), "Invalid message");
    }

    #[tokio::test]
    async fn should_echo_unknown_message_type() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(thing, &bus, ActionRunner::current());
        let text = r#"{"messageType": "fly", "data": {}}"#;

        let replies = session.handle_text(text);

        let Message::Error(data) = &replies[0] else {
            panic!("expected error");
        };
        assert_eq!(data.message, "Unknown messageType: fly");
        assert_eq!(data.request, Some(json!(text)));
    }

    #[tokio::test]
    async fn should_set_property_and_receive_status() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());

        let replies =
            session.handle_text(r#"{"messageType": "setProperty", "data": {"on": true}}"#);

        assert!(replies.is_empty());
        assert_eq!(thing.property::<bool>("on").unwrap(), Some(true));
        let received = session.next_message().await.unwrap();
        assert_eq!(received.message, Message::property_status("on", json!(true)));
    }

    #[tokio::test]
    async fn should_report_property_errors() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());

        let replies = session.handle_text(
            r#"{"messageType": "setProperty", "data": {"level": 9, "on": "yes"}}"#,
        );

        let messages: Vec<&str> = replies.iter().map(error_message).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.contains(&"read-only property"));
        assert!(
            messages
                .iter()
                .any(|m| m.starts_with("property value type not matching"))
        );
        assert_eq!(thing.property::<i64>("level").unwrap(), Some(5));
    }

    #[tokio::test]
    async fn should_follow_requested_event_topics() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());

        thing.emit_event("overheated", Some(json!(101)));
        assert!(session.try_next_message().is_none());

        session.handle_text(r#"{"messageType": "addEventSubscription", "data": {"overheated": {}}}"#);
        thing.emit_event("overheated", Some(json!(102)));

        let received = session.next_message().await.unwrap();
        assert_eq!(received.topic, "lamp/events/overheated");
    }

    #[tokio::test]
    async fn should_run_requested_action_through_all_states() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(thing, &bus, ActionRunner::current());

        session.handle_text(
            r#"{"messageType": "requestAction", "data": {"fade": {"input": {"level": 3}}}}"#,
        );

        let mut statuses = Vec::new();
        while statuses.len() < 3 {
            let received = session.next_message().await.unwrap();
            if let Message::ActionStatus(data) = &received.message {
                statuses.push(data["fade"]["status"].clone());
                assert_eq!(data["fade"]["input"], json!({"level": 3}));
            }
        }
        assert_eq!(statuses, vec![json!("created"), json!("pending"), json!("completed")]);
    }

    #[tokio::test]
    async fn should_stop_following_topics_on_close() {
        let (thing, bus) = setup();
        let mut session = ThingSession::open(thing, &bus, ActionRunner::current());
        session.handle_text(r#"{"messageType": "addEventSubscription", "data": {"overheated": {}}}"#);
        let before = bus.subscriber_count();

        session.close();

        assert_eq!(bus.subscriber_count(), before - 1);
    }
}
