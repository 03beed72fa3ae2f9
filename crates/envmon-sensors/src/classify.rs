//! Sorting inbound telemetry payloads.

use serde_json::Value;

use crate::error::SensorError;
use crate::reading::SensorReading;

/// What an inbound payload turned out to be.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A sensor sample.
    Reading(SensorReading),
    /// Carries a `temperature` field but does not decode.
    Malformed(SensorError),
    /// The server confirming it stored something we sent.
    Acknowledgement {
        /// Server message.
        message: String,
    },
    /// The server's greeting after the channel opens.
    Welcome {
        /// Server message.
        message: String,
        /// Open connections for this identity, when reported.
        connections: Option<u64>,
    },
    /// The server reporting a problem with something we sent.
    ServerError {
        /// Server message.
        message: String,
    },
    /// Anything else.
    Other,
}

/// Classify a telemetry payload. A payload is a reading iff it carries a
/// `temperature` field.
pub fn classify(payload: &Value) -> Payload {
    let Some(object) = payload.as_object() else {
        return Payload::Other;
    };
    if object.contains_key("temperature") {
        return match SensorReading::from_value(payload) {
            Ok(reading) => Payload::Reading(reading),
            Err(err) => Payload::Malformed(err),
        };
    }

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    match object.get("status").and_then(Value::as_str) {
        Some("success") if message.contains("received") => Payload::Acknowledgement { message },
        Some("connected") if !object.contains_key("type") => Payload::Welcome {
            message,
            connections: object.get("connections").and_then(Value::as_u64),
        },
        Some("error") => Payload::ServerError { message },
        _ => Payload::Other,
    }
}
