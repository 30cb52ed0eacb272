//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! Transports push what a thing publishes into a [`MessagePublisher`]; the
//! in-process bus is the default implementation.

pub mod message_publisher;

pub use message_publisher::{MessagePublisher, TopicMessage};
