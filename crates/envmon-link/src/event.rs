//! Events delivered to listeners.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use envmon_core::time::now_iso;

use crate::error::{FailureKind, LinkError};
use crate::state::ConnectionState;

/// Everything a listener can observe.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectionEvent {
    /// A state transition.
    Status(StatusEvent),
    /// An inbound JSON object with a guaranteed `timestamp` field.
    Telemetry(Value),
}

impl ConnectionEvent {
    /// The status event, if this is one.
    pub fn as_status(&self) -> Option<&StatusEvent> {
        match self {
            Self::Status(status) => Some(status),
            Self::Telemetry(_) => None,
        }
    }

    /// The telemetry payload, if this is one.
    pub fn as_telemetry(&self) -> Option<&Value> {
        match self {
            Self::Telemetry(payload) => Some(payload),
            Self::Status(_) => None,
        }
    }
}

/// `{type: "connection", status, message, timestamp, ...detail}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "connection", rename_all = "camelCase")]
pub struct StatusEvent {
    /// State entered.
    pub status: ConnectionState,
    /// Human-readable reason.
    pub message: String,
    /// ISO-8601 time of the transition.
    pub timestamp: String,
    /// Close code, for transport closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Close reason, for transport closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    /// Reconnect attempt number (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Reconnect budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Scheduled backoff delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl StatusEvent {
    /// Event stamped with the current time and no detail.
    pub fn new(status: ConnectionState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: now_iso(),
            code: None,
            reason: None,
            error: None,
            error_kind: None,
            attempt: None,
            max_attempts: None,
            delay_ms: None,
        }
    }

    #[must_use]
    pub(crate) fn with_close(mut self, code: u16, reason: &str) -> Self {
        self.code = Some(code);
        if !reason.is_empty() {
            self.reason = Some(reason.to_owned());
        }
        self
    }

    #[must_use]
    pub(crate) fn with_error(mut self, error: &LinkError) -> Self {
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        self
    }

    #[must_use]
    pub(crate) fn with_attempt(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = Some(attempt);
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub(crate) fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}
