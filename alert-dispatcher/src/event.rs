//! Sqreen webhook event model.
//!
//! Events are kept as raw JSON objects: the dispatcher only reads the
//! discriminator and the handful of display fields the backends render, so
//! everything else the platform sends passes through untouched.
//!
//! Layout of a security event:
//!
//! ```text
//! {
//!   "message_type": "security_event",
//!   "retry_count": 0,
//!   "message": {
//!     "date_occurred": "...", "application_name": "...", "event_category": "...",
//!     "risk_coefficient": 25, "humanized_description": "...", "event_url": "...",
//!     "event_id": "..."
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Discriminator value marking a security alert.
pub const SECURITY_EVENT_TYPE: &str = "security_event";

pub const MESSAGE_TYPE: &str = "message_type";
pub const MESSAGE: &str = "message";
pub const RETRY_COUNT: &str = "retry_count";
pub const RISK_COEFFICIENT: &str = "risk_coefficient";
pub const EVENT_CATEGORY: &str = "event_category";
pub const DATE_OCCURRED: &str = "date_occurred";
pub const APPLICATION_NAME: &str = "application_name";
pub const DESCRIPTION: &str = "humanized_description";
pub const EVENT_URL: &str = "event_url";
pub const EVENT_ID: &str = "event_id";

/// A field the backends need is absent or has the wrong JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field {0}")]
    Missing(String),
    #[error("field {0} has unexpected type")]
    WrongType(String),
}

/// Error parsing a webhook body into events.
#[derive(Debug, Error)]
#[error("invalid event payload: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

/// One alert as posted by the monitoring platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The `message_type` discriminator, if present and a string.
    pub fn message_type(&self) -> Option<&str> {
        self.0.get(MESSAGE_TYPE).and_then(Value::as_str)
    }

    pub fn is_security_event(&self) -> bool {
        self.message_type() == Some(SECURITY_EVENT_TYPE)
    }

    /// Short identifier used in diagnostics.
    pub fn label(&self) -> &str {
        self.0
            .get(MESSAGE)
            .and_then(|m| m.get(EVENT_ID))
            .and_then(Value::as_str)
            .unwrap_or("<no event_id>")
    }

    pub fn retry_count(&self) -> Result<i64, FieldError> {
        let value = self
            .0
            .get(RETRY_COUNT)
            .ok_or_else(|| FieldError::Missing(RETRY_COUNT.to_string()))?;
        as_integer(value).ok_or_else(|| FieldError::WrongType(RETRY_COUNT.to_string()))
    }

    pub fn date_occurred(&self) -> Result<&str, FieldError> {
        self.message_str(DATE_OCCURRED)
    }

    pub fn application_name(&self) -> Result<&str, FieldError> {
        self.message_str(APPLICATION_NAME)
    }

    pub fn event_category(&self) -> Result<&str, FieldError> {
        self.message_str(EVENT_CATEGORY)
    }

    pub fn description(&self) -> Result<&str, FieldError> {
        self.message_str(DESCRIPTION)
    }

    pub fn event_url(&self) -> Result<&str, FieldError> {
        self.message_str(EVENT_URL)
    }

    pub fn risk_coefficient(&self) -> Result<i64, FieldError> {
        let value = self.message_field(RISK_COEFFICIENT)?;
        as_integer(value).ok_or_else(|| FieldError::WrongType(nested(RISK_COEFFICIENT)))
    }

    fn message_field(&self, key: &str) -> Result<&Value, FieldError> {
        let message = self
            .0
            .get(MESSAGE)
            .ok_or_else(|| FieldError::Missing(MESSAGE.to_string()))?
            .as_object()
            .ok_or_else(|| FieldError::WrongType(MESSAGE.to_string()))?;

        message.get(key).ok_or_else(|| FieldError::Missing(nested(key)))
    }

    fn message_str(&self, key: &str) -> Result<&str, FieldError> {
        self.message_field(key)?
            .as_str()
            .ok_or_else(|| FieldError::WrongType(nested(key)))
    }
}

fn nested(key: &str) -> String {
    format!("{}.{}", MESSAGE, key)
}

// Integral floats are accepted and truncated.
fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

/// The platform posts either a JSON array of events or a single event object.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Batch(Vec<Event>),
    Single(Event),
}

/// Parse a (signature-verified) webhook body into its events.
pub fn parse_events(body: &[u8]) -> Result<Vec<Event>, PayloadError> {
    let events = match serde_json::from_slice::<Payload>(body)? {
        Payload::Batch(events) => events,
        Payload::Single(event) => vec![event],
    };
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Event {
        serde_json::from_value(json!({
            "message_type": "security_event",
            "retry_count": 2,
            "message": {
                "risk_coefficient": 25,
                "event_category": "http_error",
                "application_name": "romain_test",
                "date_occurred": "2020-06-08T18:41:14.475000+00:00",
                "event_id": "5ede864a699b1000110a9d81",
                "event_url": "https://my.sqreen.com/events/5ede864a699b1000110a9d81",
                "humanized_description": "Attack tentative from 127.0.0.1"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_accessors() {
        let event = sample();
        assert!(event.is_security_event());
        assert_eq!(event.retry_count(), Ok(2));
        assert_eq!(event.risk_coefficient(), Ok(25));
        assert_eq!(event.application_name(), Ok("romain_test"));
        assert_eq!(event.event_category(), Ok("http_error"));
        assert_eq!(event.description(), Ok("Attack tentative from 127.0.0.1"));
        assert_eq!(event.label(), "5ede864a699b1000110a9d81");
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let event: Event = serde_json::from_value(json!({
            "message_type": "security_event",
            "retry_count": "zero",
            "message": { "application_name": 7 }
        }))
        .unwrap();

        assert_eq!(
            event.retry_count(),
            Err(FieldError::WrongType("retry_count".to_string()))
        );
        assert_eq!(
            event.application_name(),
            Err(FieldError::WrongType("message.application_name".to_string()))
        );
        assert_eq!(
            event.event_url(),
            Err(FieldError::Missing("message.event_url".to_string()))
        );
        assert_eq!(event.label(), "<no event_id>");
    }

    #[test]
    fn test_non_security_event() {
        let event: Event = serde_json::from_value(json!({ "message_type": "test" })).unwrap();
        assert!(!event.is_security_event());

        let untyped: Event = serde_json::from_value(json!({})).unwrap();
        assert_eq!(untyped.message_type(), None);
    }

    #[test]
    fn test_parse_events_batch_and_single() {
        let batch = br#"[{"message_type":"security_event"},{"message_type":"test"}]"#;
        assert_eq!(parse_events(batch).unwrap().len(), 2);

        let single = br#"{"message_type":"security_event"}"#;
        let events = parse_events(single).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_security_event());
    }

    #[test]
    fn test_parse_events_rejects_non_objects() {
        assert!(parse_events(b"not json").is_err());
        assert!(parse_events(b"42").is_err());
        assert!(parse_events(b"[1, 2]").is_err());
    }
}
