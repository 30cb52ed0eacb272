//! Event: an immutable, timestamped record of something a thing reported.

use serde_json::{Map, Value as Json};

use crate::time::{Timestamp, format_timestamp};

/// A single occurrence of a named event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    thing_id: String,
    name: String,
    data: Option<Json>,
    timestamp: Timestamp,
}

impl Event {
    #[must_use]
    pub fn new(
        thing_id: impl Into<String>,
        name: impl Into<String>,
        data: Option<Json>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            thing_id: thing_id.into(),
            name: name.into(),
            data,
            timestamp,
        }
    }

    /// Id of the thing that emitted the event.
    #[must_use]
    pub fn thing_id(&self) -> &str {
        &self.thing_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> Option<&Json> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// `{"timestamp": ..., "data"?: ...}`
    #[must_use]
    pub fn description_body(&self) -> Json {
        let mut body = Map::new();
        body.insert(
            "timestamp".to_string(),
            Json::String(format_timestamp(&self.timestamp)),
        );
        if let Some(data) = &self.data {
            body.insert("data".to_string(), data.clone());
        }
        Json::Object(body)
    }

    /// `{"<name>": {"timestamp": ..., "data"?: ...}}`
    #[must_use]
    pub fn as_event_description(&self) -> Json {
        let mut description = Map::new();
        description.insert(self.name.clone(), self.description_body());
        Json::Object(description)
    }
}
