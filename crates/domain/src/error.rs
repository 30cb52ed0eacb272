//! Common error types used across the workspace.
//!
//! Each concern owns a typed error enum; [`WebThingError`] gathers them with
//! `#[from]` conversions so callers that don't care about the concern can
//! propagate with `?`.

use crate::property::ValueKind;

/// Top-level error for the web thing resource model.
#[derive(Debug, thiserror::Error)]
pub enum WebThingError {
    #[error("invalid json")]
    InvalidJson(#[from] InvalidJson),

    #[error("property error")]
    Property(#[from] PropertyError),

    #[error("action error")]
    Action(#[from] ActionError),

    #[error("event error")]
    Event(#[from] EventError),

    #[error("storage error")]
    Storage(#[from] StorageError),
}

/// A value was rejected by the schema validation gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvalidJson {
    message: String,
}

impl InvalidJson {
    /// Wrap the message reported by the validator.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The validator message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised when creating, reading or writing a property.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    /// Property metadata was not a JSON object.
    #[error("property metadata must be a JSON object")]
    MetadataNotObject,

    /// The property was addressed through the wrong value type.
    #[error("property value type not matching: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The kind of value the property holds.
        expected: ValueKind,
        /// The kind of value that was supplied or requested.
        actual: ValueKind,
    },

    /// The property is declared `readOnly`.
    #[error("read-only property")]
    ReadOnly,

    /// The validation gateway rejected the value.
    #[error("invalid property value - {0}")]
    InvalidValue(#[source] InvalidJson),
}

/// Errors raised when registering or running actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Action metadata was not a JSON object.
    #[error("action metadata must be a JSON object")]
    MetadataNotObject,

    /// The action requires an input but none was supplied.
    #[error("input must not be empty for action '{0}'")]
    MissingInput(String),

    /// The action factory refused to build the action.
    #[error("construction of action '{name}' failed: {reason}")]
    Construction {
        /// Action name.
        name: String,
        /// Reason given by the factory.
        reason: String,
    },

    /// `start` was called on an action that already left `created`.
    #[error("action '{id}' already started")]
    AlreadyStarted {
        /// Action id.
        id: String,
    },
}

/// Errors raised when registering events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// Event metadata was not a JSON object.
    #[error("event metadata must be a JSON object")]
    MetadataNotObject,
}

/// Errors raised by history stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Positional access past the current size.
    #[error("index {index} out of range for history of size {len}")]
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Current number of stored elements.
        len: usize,
    },
}
