//! Frame parser.

use serde_json::Value;
use tracing::debug;

use super::types::{Envelope, ServerError};
use crate::error::{Error, Result};
use crate::event::{HookEvent, ReceivedAt};

/// Fields that may carry the category tag, in lookup order.
const TAG_FIELDS: [&str; 3] = ["category", "type", "event"];

/// Decode a single text frame.
pub fn decode_frame(text: &str) -> Result<Envelope> {
    let raw: Value =
        serde_json::from_str(text).map_err(|e| Error::Decode(format!("invalid JSON: {e}")))?;
    decode_value(&raw)
}

/// Decode an already-parsed JSON value.
pub fn decode_value(raw: &Value) -> Result<Envelope> {
    if !raw.is_object() {
        return Err(Error::Decode("envelope is not a JSON object".into()));
    }
    let category = TAG_FIELDS
        .iter()
        .find_map(|field| raw.get(*field).and_then(Value::as_str))
        .ok_or_else(|| Error::Decode("missing category tag".into()))?;

    match normalize_category(category).as_str() {
        "connected" => Ok(Envelope::Connected),
        "hookcalled" => parse_hook_called(raw).map(Envelope::HookCalled),
        "error" => Ok(Envelope::Error(parse_error(raw))),
        "ping" => Ok(Envelope::Ping),
        "pong" => Ok(Envelope::Pong),
        _ => {
            debug!(%category, "Unrecognized envelope category");
            Ok(Envelope::Unknown {
                category: category.to_string(),
                raw: raw.clone(),
            })
        }
    }
}

/// Lowercase and strip separators so `hook-called`, `hook_called` and
/// `hookCalled` compare equal.
pub fn normalize_category(category: &str) -> String {
    category
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_hook_called(raw: &Value) -> Result<HookEvent> {
    // Some service versions nest the event under `data`.
    let body = raw.get("data").filter(|v| v.is_object()).unwrap_or(raw);

    let event_id = required_str(body, "eventId")?;
    let hook_id = required_str(body, "hookId")?;

    let received_at = match body.get("receivedAt") {
        Some(Value::String(s)) => Some(ReceivedAt::Text(s.clone())),
        Some(Value::Number(n)) => n.as_i64().map(ReceivedAt::Epoch),
        _ => None,
    };

    let payload = body.get("payload").filter(|v| !v.is_null()).cloned();

    Ok(HookEvent {
        event_id,
        hook_id,
        received_at,
        payload,
    })
}

fn required_str(body: &Value, field: &'static str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(Error::MissingField {
            category: "hook-called",
            field,
        })
}

fn parse_error(raw: &Value) -> ServerError {
    let code = raw
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let message = raw
        .get("message")
        .or_else(|| raw.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unspecified server error")
        .to_string();
    ServerError { code, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_hook_called() {
        let frame = r#"{"category":"hook-called","eventId":"e1","hookId":"h1","receivedAt":"2024-01-01T00:00:00Z","payload":"{\"a\":1}"}"#;
        let Envelope::HookCalled(event) = decode_frame(frame).unwrap() else {
            panic!("expected hook-called envelope");
        };
        assert_eq!(event.event_id, "e1");
        assert_eq!(event.hook_id, "h1");
        assert_eq!(
            event.received_at,
            Some(ReceivedAt::Text("2024-01-01T00:00:00Z".into()))
        );
        assert_eq!(event.payload, Some(json!("{\"a\":1}")));
    }

    #[test]
    fn category_spellings_are_equivalent() {
        for tag in ["hook-called", "hook_called", "hookCalled", "HOOK_CALLED"] {
            let raw = json!({"type": tag, "eventId": "e", "hookId": "h"});
            assert!(
                matches!(decode_value(&raw).unwrap(), Envelope::HookCalled(_)),
                "{tag}"
            );
        }
    }

    #[test]
    fn nested_data_is_accepted() {
        let raw = json!({
            "event": "hook_called",
            "data": {
                "eventId": "e2",
                "hookId": "h2",
                "receivedAt": 1_700_000_000,
                "payload": {"k": "v"},
            }
        });
        let Envelope::HookCalled(event) = decode_value(&raw).unwrap() else {
            panic!("expected hook-called envelope");
        };
        assert_eq!(event.event_id, "e2");
        assert_eq!(event.received_at, Some(ReceivedAt::Epoch(1_700_000_000)));
        assert_eq!(event.payload, Some(json!({"k": "v"})));
    }

    #[test]
    fn missing_hook_id_is_an_error() {
        let err = decode_frame(r#"{"category":"hook-called","eventId":"e1"}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField {
                field: "hookId",
                ..
            }
        ));
    }

    #[test]
    fn empty_event_id_is_an_error() {
        let err = decode_frame(r#"{"category":"hook-called","eventId":"","hookId":"h"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField {
                field: "eventId",
                ..
            }
        ));
    }

    #[test]
    fn null_payload_is_absent() {
        let raw = json!({
            "category": "hook-called",
            "eventId": "e",
            "hookId": "h",
            "payload": null,
        });
        let Envelope::HookCalled(event) = decode_value(&raw).unwrap() else {
            panic!("expected hook-called envelope");
        };
        assert!(event.payload.is_none());
        assert!(event.received_at.is_none());
    }

    #[test]
    fn connected_and_keepalive() {
        assert_eq!(decode_frame(r#"{"category":"connected"}"#).unwrap(), Envelope::Connected);
        assert_eq!(decode_frame(r#"{"type":"ping"}"#).unwrap(), Envelope::Ping);
        assert_eq!(decode_frame(r#"{"type":"pong"}"#).unwrap(), Envelope::Pong);
    }

    #[test]
    fn error_envelope() {
        let env = decode_frame(r#"{"category":"error","code":"UNAUTHORIZED","message":"bad key"}"#)
            .unwrap();
        let Envelope::Error(err) = env else {
            panic!("expected error envelope");
        };
        assert_eq!(err.code, "unauthorized");
        assert_eq!(err.message, "bad key");
        assert!(err.is_auth_rejection());
    }

    #[test]
    fn unknown_category_is_tolerated() {
        let env = decode_frame(r#"{"category":"stats","count":3}"#).unwrap();
        assert!(matches!(env, Envelope::Unknown { ref category, .. } if category == "stats"));
        assert_eq!(env.category(), "stats");
    }

    #[test]
    fn non_json_is_decode_error() {
        assert!(matches!(decode_frame("not json"), Err(Error::Decode(_))));
        assert!(matches!(decode_frame("[1,2]"), Err(Error::Decode(_))));
        assert!(matches!(decode_frame(r#"{"eventId":"e"}"#), Err(Error::Decode(_))));
    }
}
