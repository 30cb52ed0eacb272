//! Message publisher port: fan-out of thing messages to subscribers.

use std::sync::Arc;

use webthing_domain::message::Message;
use webthing_domain::thing::Thing;

/// A message together with the topic it was published on.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    pub topic: String,
    pub message: Message,
}

/// Delivers thing messages to interested subscribers.
///
/// Publishing happens on the thread that changed the thing, so
/// implementations must not block.
pub trait MessagePublisher: Send + Sync {
    /// Publish a message to all current subscribers.
    fn publish(&self, message: TopicMessage);
}

impl<T: MessagePublisher + ?Sized> MessagePublisher for Arc<T> {
    fn publish(&self, message: TopicMessage) {
        (**self).publish(message);
    }
}

/// Forward everything `thing` publishes to `publisher`.
pub fn attach_thing(thing: &Thing, publisher: impl MessagePublisher + 'static) {
    thing.add_message_observer(move |topic, message| {
        publisher.publish(TopicMessage {
            topic: topic.to_string(),
            message: message.clone(),
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use webthing_domain::value::Value;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TopicMessage>>);

    impl MessagePublisher for Recorder {
        fn publish(&self, message: TopicMessage) {
            self.0.lock().unwrap().push(message);
        }
    }

    #[test]
    fn should_forward_thing_messages_with_topic() {
        let thing = Thing::builder().id("lamp").build();
        let recorder = Arc::new(Recorder::default());
        attach_thing(&thing, Arc::clone(&recorder));
        thing
            .link_property("on", Value::new(false), json!({}))
            .unwrap();

        thing.set_property("on", true).unwrap();

        let published = recorder.0.lock().unwrap();
        assert_eq!(
            *published,
            vec![TopicMessage {
                topic: "lamp/properties".to_string(),
                message: Message::property_status("on", json!(true)),
            }]
        );
    }
}
