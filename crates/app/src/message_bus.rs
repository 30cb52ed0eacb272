//! In-process message bus backed by a tokio broadcast channel.
//!
//! Every attached thing publishes into one channel. Each [`Subscription`]
//! keeps its own set of topics and skips messages published on other topics,
//! so ordering is preserved per publisher but there is no cross-topic
//! guarantee beyond channel order.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream, wrappers::errors::BroadcastStreamRecvError};

use webthing_domain::thing::Thing;

use crate::ports::message_publisher::attach_thing;
use crate::ports::{MessagePublisher, TopicMessage};

/// In-process message bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the message is simply dropped).
#[derive(Debug, Clone)]
pub struct InProcessMessageBus {
    sender: broadcast::Sender<Arc<TopicMessage>>,
}

impl InProcessMessageBus {
    /// Create a bus whose subscribers may lag `capacity` messages behind.
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Route every message of `thing` through this bus.
    pub fn attach(&self, thing: &Thing) {
        attach_thing(thing, self.clone());
        tracing::debug!(thing = thing.id(), "thing attached to message bus");
    }

    /// A subscription without topics; see [`Subscription::subscribe`].
    ///
    /// Only messages published *after* this call are delivered.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            topics: BTreeSet::new(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl MessagePublisher for InProcessMessageBus {
    fn publish(&self, message: TopicMessage) {
        // send fails only when there are zero receivers
        let _ = self.sender.send(Arc::new(message));
    }
}

/// A receiver filtered to a set of topics.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<TopicMessage>>,
    topics: BTreeSet<String>,
}

impl Subscription {
    pub fn subscribe(&mut self, topic: impl Into<String>) {
        self.topics.insert(topic.into());
    }

    pub fn unsubscribe(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    /// Drop every topic starting with `prefix`.
    pub fn unsubscribe_prefix(&mut self, prefix: &str) {
        self.topics.retain(|topic| !topic.starts_with(prefix));
    }

    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    #[must_use]
    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    /// Wait for the next message on a subscribed topic. Returns `None` once
    /// the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<TopicMessage>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.topics.contains(&message.topic) => return Some(message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged behind, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The next already-queued message on a subscribed topic, if any.
    pub fn try_recv(&mut self) -> Option<Arc<TopicMessage>> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if self.topics.contains(&message.topic) => return Some(message),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged behind, messages dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Turn into a stream of messages on the current topics.
    pub fn into_stream(self) -> impl Stream<Item = Arc<TopicMessage>> + Send {
        let topics = self.topics;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(message) if topics.contains(&message.topic) => Some(message),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "subscription stream lagged behind, messages dropped");
                None
            }
        })
    }
}
