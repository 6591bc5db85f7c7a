//! Hook event model.
//!
//! A [`HookEvent`] is one notification that a registered webhook was invoked.
//! The payload is carried through untouched; `hookR` never interprets it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Service-assigned receipt time.
///
/// The service has sent both RFC 3339 strings and epoch numbers over time, so
/// both are accepted and rendered back in their original form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceivedAt {
    Text(String),
    Epoch(i64),
}

impl fmt::Display for ReceivedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Epoch(n) => write!(f, "{n}"),
        }
    }
}

/// Notification that a webhook fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEvent {
    /// Unique per notification.
    pub event_id: String,
    /// Which registered webhook fired.
    pub hook_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<ReceivedAt>,
    /// Opaque payload: a string, a structured document, or nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl HookEvent {
    pub fn new(event_id: impl Into<String>, hook_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            hook_id: hook_id.into(),
            received_at: None,
            payload: None,
        }
    }

    #[must_use]
    pub fn with_received_at(mut self, received_at: ReceivedAt) -> Self {
        self.received_at = Some(received_at);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The payload with textual JSON expanded into a structured value.
    ///
    /// Services frequently forward the raw request body as a string. When that
    /// string parses as JSON the parsed document is returned; otherwise the
    /// payload is returned unchanged. `None` when there is no payload.
    pub fn structured_payload(&self) -> Option<Value> {
        match self.payload.as_ref()? {
            Value::Null => None,
            Value::String(s) => {
                Some(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())))
            }
            other => Some(other.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_camel_case() {
        let event = HookEvent::new("e1", "h1")
            .with_received_at(ReceivedAt::Text("2024-01-01T00:00:00Z".into()));
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["eventId"], "e1");
        assert_eq!(v["hookId"], "h1");
        assert_eq!(v["receivedAt"], "2024-01-01T00:00:00Z");
        assert!(v.get("payload").is_none());
    }

    #[test]
    fn received_at_accepts_epoch() {
        let raw = json!({"eventId": "e", "hookId": "h", "receivedAt": 1_700_000_000});
        let event: HookEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.received_at, Some(ReceivedAt::Epoch(1_700_000_000)));
        assert_eq!(event.received_at.unwrap().to_string(), "1700000000");
    }

    #[test]
    fn structured_payload_parses_textual_json() {
        let event = HookEvent::new("e", "h").with_payload(json!("{\"a\":1}"));
        assert_eq!(event.structured_payload(), Some(json!({"a": 1})));
    }

    #[test]
    fn structured_payload_keeps_plain_text() {
        let event = HookEvent::new("e", "h").with_payload(json!("hello world"));
        assert_eq!(event.structured_payload(), Some(json!("hello world")));
    }

    #[test]
    fn structured_payload_absent() {
        assert_eq!(HookEvent::new("e", "h").structured_payload(), None);
        let null = HookEvent::new("e", "h").with_payload(Value::Null);
        assert_eq!(null.structured_payload(), None);
    }
}
