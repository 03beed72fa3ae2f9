//! Manager configuration.

use std::time::Duration;

use envmon_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_IDENTITY_PARAM,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_TELEMETRY_URL,
};
use envmon_core::retry::BackoffConfig;
use envmon_settings::LinkSettings;

/// Runtime parameters of a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    /// Endpoint without the identity query.
    pub url: String,
    /// Query parameter carrying the identity.
    pub identity_param: String,
    /// Time allowed for a channel to open.
    pub connect_timeout: Duration,
    /// Heartbeat period while connected.
    pub heartbeat_interval: Duration,
    /// Reconnect backoff curve.
    pub backoff: BackoffConfig,
    /// Consecutive failed reconnects before `failed`.
    pub max_attempts: u32,
    /// Bound on queued outbound frames per channel.
    pub outbound_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TELEMETRY_URL.to_string(),
            identity_param: DEFAULT_IDENTITY_PARAM.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            backoff: BackoffConfig::default(),
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl From<&LinkSettings> for LinkConfig {
    fn from(settings: &LinkSettings) -> Self {
        Self {
            url: settings.url.clone(),
            identity_param: settings.identity_param.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            backoff: settings.reconnect.clone(),
            max_attempts: settings.max_reconnect_attempts,
            outbound_capacity: settings.outbound_capacity.max(1),
        }
    }
}
