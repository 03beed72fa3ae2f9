//! Wire contract of the telemetry channel.
//!
//! - URL: `<base>?<param>=<percent-encoded identity>`
//! - outbound heartbeat: `{"type":"ping","timestamp":<ISO-8601>}`
//! - inbound `{"type":"pong"}` is a keep-alive acknowledgement
//! - any other inbound JSON object is telemetry

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};

use envmon_core::time::now_iso;

use crate::error::{LinkError, Result};

/// Characters escaped in a query component; matches `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Decoded inbound text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Heartbeat reply; not delivered to listeners.
    KeepAlive,
    /// Telemetry object, timestamp guaranteed.
    Payload(Value),
}

/// Build the channel URL for `identity`.
pub fn channel_url(base: &str, identity_param: &str, identity: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let encoded = utf8_percent_encode(identity, COMPONENT);
    format!("{base}{separator}{identity_param}={encoded}")
}

/// Heartbeat frame stamped with the current time.
pub fn heartbeat_payload() -> String {
    json!({ "type": "ping", "timestamp": now_iso() }).to_string()
}

/// Decode an inbound text frame.
///
/// Fails with [`LinkError::Protocol`] for invalid JSON and for JSON that is
/// not an object. Objects without a usable `timestamp` get the receipt time.
pub fn decode_inbound(text: &str) -> Result<Inbound> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LinkError::Protocol(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(LinkError::Protocol(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    };

    if object.get("type").and_then(Value::as_str) == Some("pong") {
        return Ok(Inbound::KeepAlive);
    }
    if object.get("timestamp").is_none_or(Value::is_null) {
        let _ = object.insert("timestamp".to_owned(), Value::String(now_iso()));
    }
    Ok(Inbound::Payload(Value::Object(object)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
