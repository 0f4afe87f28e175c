//! Request and response bodies of the HTTP API.

use abstractgateway::ConnectionState;
use postgresdb::{EventId, NewEvent};
use serde::Serialize;

pub const MISSING_FIELDS: &str = "Missing required fields: type, user";
pub const INVALID_JSON: &str = "Invalid JSON body.";
pub const INTERNAL_ERROR: &str = "Internal server error.";
pub const BROKER_UNAVAILABLE: &str = "Broker unavailable.";
pub const EVENT_RECEIVED: &str = "Event received";

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("body is not a JSON object")]
    NotAnObject,
    #[error("missing required fields: type, user")]
    MissingFields,
}

impl ValidationError {
    /// Text returned to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            ValidationError::InvalidJson(_) | ValidationError::NotAnObject => INVALID_JSON,
            ValidationError::MissingFields => MISSING_FIELDS,
        }
    }
}

/// A validated activity report.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRequest {
    pub event_type: String,
    pub user_id: String,
    pub data: Option<serde_json::Value>,
}

impl ActivityRequest {
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let serde_json::Value::Object(mut fields) = serde_json::from_slice::<serde_json::Value>(body)? else {
            return Err(ValidationError::NotAnObject);
        };

        // Wrongly typed fields are reported the same way as missing ones.
        let event_type = fields.get("type").and_then(non_empty_str);
        let user_id = fields.get("user").and_then(user_ref);

        match (event_type, user_id) {
            (Some(event_type), Some(user_id)) => Ok(Self {
                event_type,
                user_id,
                data: fields.remove("data"),
            }),
            _ => Err(ValidationError::MissingFields),
        }
    }

    /// Stamp with the receipt time.
    pub fn into_event(self) -> NewEvent {
        NewEvent::new(self.event_type, self.user_id, self.data)
    }
}

/// Blank strings count as missing; anything else is kept verbatim.
fn non_empty_str(v: &serde_json::Value) -> Option<String> {
    let s = v.as_str()?;
    (!s.trim().is_empty()).then(|| s.to_string())
}

/// Users are identified by a string or an integer; integers are kept in
/// their decimal form.
fn user_ref(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        other => non_empty_str(other),
    }
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub event_id: EventId,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_string_and_integer_users() {
        let r = ActivityRequest::parse(br#"{"type":"task_created","user":"u1"}"#).unwrap();
        assert_eq!(r.user_id, "u1");
        assert!(r.data.is_none());

        let r = ActivityRequest::parse(br#"{"type":"task_created","user":123}"#).unwrap();
        assert_eq!(r.user_id, "123");
    }

    #[test]
    fn values_are_stored_as_sent() {
        let r = ActivityRequest::parse(br#"{"type":" task_created","user":"u1 "}"#).unwrap();
        assert_eq!(r.event_type, " task_created");
        assert_eq!(r.user_id, "u1 ");
    }

    #[test]
    fn missing_or_blank_fields() {
        for body in [
            r#"{}"#,
            r#"{"type":"task_created"}"#,
            r#"{"user":"u1"}"#,
            r#"{"type":"","user":"u1"}"#,
            r#"{"type":"task_created","user":"   "}"#,
            r#"{"type":null,"user":"u1"}"#,
            r#"{"type":7,"user":"u1"}"#,
            r#"{"type":"task_created","user":1.5}"#,
        ] {
            let err = ActivityRequest::parse(body.as_bytes()).unwrap_err();
            assert!(matches!(err, ValidationError::MissingFields), "body {body}");
            assert_eq!(err.public_message(), MISSING_FIELDS);
        }
    }

    #[test]
    fn non_object_bodies_are_invalid_json() {
        for body in ["", "not json", "[1,2]", "\"task\""] {
            let err = ActivityRequest::parse(body.as_bytes()).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidJson(_) | ValidationError::NotAnObject),
                "body {body}"
            );
            assert_eq!(err.public_message(), INVALID_JSON);
        }
    }

    #[test]
    fn data_defaults_to_empty_object() {
        let event = ActivityRequest::parse(br#"{"type":"t","user":"u","data":null}"#)
            .unwrap()
            .into_event();
        assert_eq!(event.data_payload, serde_json::json!({}));
    }
}
