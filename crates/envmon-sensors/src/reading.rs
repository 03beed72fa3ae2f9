//! Sensor readings.
//!
//! The backend is not strict about types: numbers sometimes arrive as
//! strings and `obstacle` shows up as a boolean, a number or a string.
//! Decoding accepts all of those and normalizes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use envmon_core::time::{format_iso, parse_timestamp};

use crate::error::{Result, SensorError};

/// One sample from a sensor node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct SensorReading {
    /// Backend row id, when the reading has been stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Whether the proximity sensor reports an obstacle.
    pub obstacle: bool,
    /// When the sample was taken (or received, if the node sent none).
    pub timestamp: DateTime<Utc>,
    /// Owning user, when the backend includes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl SensorReading {
    /// Decode a reading from a JSON object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or(SensorError::NotAnObject)?;
        Ok(Self {
            id: integer(object, "id"),
            temperature: number(object, "temperature")?,
            humidity: number(object, "humidity")?,
            obstacle: object.get("obstacle").is_some_and(truthy),
            timestamp: timestamp(object)?,
            user_id: integer(object, "user_id"),
        })
    }

    /// Decode a reading from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SensorError::InvalidJson(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Timestamp in the same format outbound frames use.
    pub fn timestamp_iso(&self) -> String {
        format_iso(self.timestamp)
    }
}

impl TryFrom<Value> for SensorReading {
    type Error = SensorError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

fn present<'a>(object: &'a Map<String, Value>, field: &'static str) -> Option<&'a Value> {
    object.get(field).filter(|value| !value.is_null())
}

fn number(object: &Map<String, Value>, field: &'static str) -> Result<f64> {
    let value = present(object, field).ok_or(SensorError::MissingField(field))?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| SensorError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn integer(object: &Map<String, Value>, field: &'static str) -> Option<i64> {
    match present(object, field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings count only when they spell `"true"` or `"1"`; everything else
/// follows the usual truthiness of its JSON type.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => s == "true" || s == "1",
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn timestamp(object: &Map<String, Value>) -> Result<DateTime<Utc>> {
    let value = present(object, "timestamp").ok_or(SensorError::MissingField("timestamp"))?;
    value
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| SensorError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "id": 42,
            "temperature": 22.4,
            "humidity": 41.0,
            "obstacle": false,
            "timestamp": "2026-03-01T10:00:00.250000",
            "user_id": 7
        })
    }

    #[test]
    fn decodes_backend_broadcast() {
        let reading = SensorReading::from_value(&base()).unwrap();
        assert_eq!(reading.id, Some(42));
        assert_eq!(reading.user_id, Some(7));
        assert!((reading.temperature - 22.4).abs() < f64::EPSILON);
        assert!(!reading.obstacle);
        assert_eq!(reading.timestamp_iso(), "2026-03-01T10:00:00.250Z");
    }

    #[test]
    fn numeric_strings_are_parsed() {
        let mut value = base();
        value["temperature"] = json!(" 19.75 ");
        value["humidity"] = json!("55");
        let reading = SensorReading::from_value(&value).unwrap();
        assert!((reading.temperature - 19.75).abs() < f64::EPSILON);
        assert!((reading.humidity - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_string_is_rejected() {
        let mut value = base();
        value["humidity"] = json!("wet");
        assert_matches!(
            SensorReading::from_value(&value),
            Err(SensorError::InvalidNumber { field: "humidity", .. })
        );
    }

    #[test]
    fn nan_string_is_rejected() {
        let mut value = base();
        value["temperature"] = json!("NaN");
        assert_matches!(
            SensorReading::from_value(&value),
            Err(SensorError::InvalidNumber { field: "temperature", .. })
        );
    }

    #[test]
    fn obstacle_coercion() {
        let cases = [
            (json!(true), true),
            (json!(false), false),
            (json!(1), true),
            (json!(0), false),
            (json!("true"), true),
            (json!("1"), true),
            (json!("yes"), false),
            (json!("false"), false),
            (Value::Null, false),
        ];
        for (raw, expected) in cases {
            let mut value = base();
            value["obstacle"] = raw.clone();
            let reading = SensorReading::from_value(&value).unwrap();
            assert_eq!(reading.obstacle, expected, "obstacle = {raw}");
        }
    }

    #[test]
    fn missing_obstacle_is_false() {
        let mut value = base();
        let _ = value.as_object_mut().unwrap().remove("obstacle");
        assert!(!SensorReading::from_value(&value).unwrap().obstacle);
    }

    #[test]
    fn missing_humidity_is_rejected() {
        let mut value = base();
        value["humidity"] = Value::Null;
        assert_eq!(
            SensorReading::from_value(&value),
            Err(SensorError::MissingField("humidity"))
        );
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let mut value = base();
        value["timestamp"] = json!("yesterday");
        assert_matches!(
            SensorReading::from_value(&value),
            Err(SensorError::InvalidTimestamp(_))
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(
            SensorReading::from_value(&json!([1, 2])),
            Err(SensorError::NotAnObject)
        );
        assert_matches!(
            SensorReading::from_json("{oops"),
            Err(SensorError::InvalidJson(_))
        );
    }

    #[test]
    fn serde_uses_lenient_decoding() {
        let reading: SensorReading = serde_json::from_str(
            r#"{"temperature":"21","humidity":40,"obstacle":"1","timestamp":"2026-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(reading.obstacle);
        assert_eq!(reading.id, None);
        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
        );

        let json = serde_json::to_value(&reading).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["temperature"], 21.0);
    }
}
