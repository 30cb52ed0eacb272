//! Wire messages pushed to subscribers and their topics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Status string carried by every error envelope.
pub const BAD_REQUEST: &str = "400 Bad Request";

/// A message as it is sent to subscribers.
///
/// Serializes to `{"messageType": "<type>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", content = "data", rename_all = "camelCase")]
pub enum Message {
    /// `{"<property>": <value>}`
    PropertyStatus(Map<String, Json>),
    /// `{"<action>": <action description>}`
    ActionStatus(Map<String, Json>),
    /// `{"<event>": <event description>}`
    Event(Map<String, Json>),
    Error(ErrorData),
}

/// Payload of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Json>,
}

impl Message {
    /// Wrap a single `name → payload` entry as `propertyStatus`.
    #[must_use]
    pub fn property_status(name: &str, value: Json) -> Self {
        Self::PropertyStatus(single(name, value))
    }

    /// Wrap a single `name → description` entry as `actionStatus`.
    #[must_use]
    pub fn action_status(name: &str, description: Json) -> Self {
        Self::ActionStatus(single(name, description))
    }

    /// Wrap a single `name → description` entry as `event`.
    #[must_use]
    pub fn event(name: &str, description: Json) -> Self {
        Self::Event(single(name, description))
    }

    /// A `400 Bad Request` error envelope.
    #[must_use]
    pub fn bad_request(message: impl Into<String>, request: Option<Json>) -> Self {
        Self::Error(ErrorData {
            status: BAD_REQUEST.to_string(),
            message: message.into(),
            request,
        })
    }

    /// The wire name of this message type.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::PropertyStatus(_) => "propertyStatus",
            Self::ActionStatus(_) => "actionStatus",
            Self::Event(_) => "event",
            Self::Error(_) => "error",
        }
    }

    /// Render as a JSON document.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let data = match self {
            Self::PropertyStatus(data) | Self::ActionStatus(data) | Self::Event(data) => {
                Json::Object(data.clone())
            }
            Self::Error(err) => {
                let mut data = Map::new();
                data.insert("status".to_string(), Json::String(err.status.clone()));
                data.insert("message".to_string(), Json::String(err.message.clone()));
                if let Some(request) = &err.request {
                    data.insert("request".to_string(), request.clone());
                }
                Json::Object(data)
            }
        };
        let mut envelope = Map::new();
        envelope.insert(
            "messageType".to_string(),
            Json::String(self.message_type().to_string()),
        );
        envelope.insert("data".to_string(), data);
        Json::Object(envelope)
    }
}

fn single(name: &str, payload: Json) -> Map<String, Json> {
    let mut map = Map::new();
    map.insert(name.to_string(), payload);
    map
}

/// `<thing id>/properties`
#[must_use]
pub fn properties_topic(thing_id: &str) -> String {
    format!("{thing_id}/properties")
}

/// `<thing id>/actions`
#[must_use]
pub fn actions_topic(thing_id: &str) -> String {
    format!("{thing_id}/actions")
}

/// `<thing id>/events/<event name>`
#[must_use]
pub fn event_topic(thing_id: &str, event_name: &str) -> String {
    format!("{thing_id}/events/{event_name}")
}
