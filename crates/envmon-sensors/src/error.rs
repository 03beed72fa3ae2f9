//! Sensor decoding errors.

use thiserror::Error;

/// Why a payload could not be read as a [`SensorReading`](crate::SensorReading).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SensorError {
    /// The payload is not a JSON object.
    #[error("reading must be a JSON object")]
    NotAnObject,
    /// A required field is absent or null.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A numeric field holds something that is not a number.
    #[error("field `{field}` is not numeric: {value}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Offending value, as JSON.
        value: String,
    },
    /// The timestamp could not be parsed.
    #[error("unrecognized timestamp: {0}")]
    InvalidTimestamp(String),
    /// The text is not JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Result type for sensor decoding.
pub type Result<T> = std::result::Result<T, SensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_number_display() {
        let err = SensorError::InvalidNumber {
            field: "humidity",
            value: "\"wet\"".into(),
        };
        assert_eq!(err.to_string(), "field `humidity` is not numeric: \"wet\"");
    }

    #[test]
    fn missing_field_display() {
        assert_eq!(
            SensorError::MissingField("timestamp").to_string(),
            "missing field `timestamp`"
        );
    }
}
