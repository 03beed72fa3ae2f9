//! Settings types.
//!
//! Every struct is `camelCase` on disk and fills missing keys from its
//! `Default` impl, so a partial `settings.json` is always valid.

use std::path::PathBuf;

use envmon_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_IDENTITY_PARAM,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_TELEMETRY_URL,
};
use envmon_core::retry::BackoffConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvmonSettings {
    /// Telemetry channel.
    pub link: LinkSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Persisted session lookup.
    pub session: SessionSettings,
}

impl EnvmonSettings {
    /// Reject values the connection manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        let link = &self.link;
        if !(link.url.starts_with("ws://") || link.url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "link.url must use ws:// or wss://, got {}",
                link.url
            )));
        }
        if link.identity_param.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "link.identityParam must not be empty".into(),
            ));
        }
        if link.connect_timeout_ms == 0 || link.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "link timeouts and intervals must be positive".into(),
            ));
        }
        if link.reconnect.max_interval_ms < link.reconnect.base_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "link.reconnect.maxIntervalMs ({}) is below baseIntervalMs ({})",
                link.reconnect.max_interval_ms, link.reconnect.base_interval_ms
            )));
        }
        if !(0.0..=1.0).contains(&link.reconnect.jitter_factor) {
            return Err(SettingsError::InvalidValue(format!(
                "link.reconnect.jitterFactor must be within 0..=1, got {}",
                link.reconnect.jitter_factor
            )));
        }
        if !(1..=1000).contains(&link.max_reconnect_attempts) {
            return Err(SettingsError::InvalidValue(format!(
                "link.maxReconnectAttempts must be within 1..=1000, got {}",
                link.max_reconnect_attempts
            )));
        }
        if link.outbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "link.outboundCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Telemetry channel settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkSettings {
    /// WebSocket endpoint without the identity query.
    pub url: String,
    /// Query parameter name carrying the identity.
    pub identity_param: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Heartbeat period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Consecutive failed reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// Reconnect backoff curve.
    pub reconnect: BackoffConfig,
    /// Bound on queued outbound frames.
    pub outbound_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_TELEMETRY_URL.to_string(),
            identity_param: DEFAULT_IDENTITY_PARAM.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect: BackoffConfig::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Where to find the persisted dashboard session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Session file; `~/.envmon/session.json` when unset.
    pub session_file: Option<String>,
    /// Identity to connect with when none is given on the command line.
    pub identity: Option<String>,
}

impl SessionSettings {
    /// Resolved session file path.
    pub fn session_path(&self) -> PathBuf {
        self.session_file
            .as_ref()
            .map_or_else(|| crate::loader::envmon_home().join("session.json"), PathBuf::from)
    }
}
