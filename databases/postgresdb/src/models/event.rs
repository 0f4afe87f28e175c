use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the record store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An accepted activity event that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "data", default = "empty_payload")]
    pub data_payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl NewEvent {
    /// Stamp a new event with the current time. `None` or JSON `null` data
    /// becomes an empty object.
    pub fn new(
        event_type: impl Into<String>,
        user_id: impl Into<String>,
        data_payload: Option<serde_json::Value>,
    ) -> Self {
        Self::at(event_type, user_id, Utc::now(), data_payload)
    }

    pub fn at(
        event_type: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        data_payload: Option<serde_json::Value>,
    ) -> Self {
        let data_payload = match data_payload {
            None | Some(serde_json::Value::Null) => empty_payload(),
            Some(v) => v,
        };

        Self {
            event_type: event_type.into(),
            user_id: user_id.into(),
            timestamp,
            data_payload,
        }
    }

    /// Attach the store-assigned id.
    pub fn into_stored(self, event_id: EventId) -> StoredEvent {
        StoredEvent {
            event_id,
            event: self,
        }
    }
}

/// An event that has a row in the record store. This is the only shape that
/// gets published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    #[serde(flatten)]
    pub event: NewEvent,
}
