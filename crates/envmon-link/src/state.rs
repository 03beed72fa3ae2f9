//! Connection lifecycle states and the public status snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the telemetry channel. Exactly one holds at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No channel and nothing scheduled.
    #[default]
    Disconnected,
    /// Channel opening, connect timeout running.
    Connecting,
    /// Channel open; heartbeat running.
    Connected,
    /// Waiting on the backoff timer.
    Reconnecting,
    /// The last open attempt timed out.
    Timeout,
    /// The last open attempt failed, or there was nothing to connect with.
    Error,
    /// Reconnect budget spent; only `force_reconnect` or `connect` resume.
    Failed,
}

impl ConnectionState {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    /// States a user should be told about as a problem.
    pub fn is_problem(self) -> bool {
        matches!(self, Self::Timeout | Self::Error | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the manager, as returned by `status()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// `status == Connected`.
    pub connected: bool,
    /// Current state.
    pub status: ConnectionState,
    /// Most recent failure description, cleared on a successful open.
    pub last_error: Option<String>,
    /// Consecutive failed reconnect attempts.
    pub reconnect_attempts: u32,
    /// Configured reconnect budget.
    pub max_reconnect_attempts: u32,
    /// A backoff timer is pending.
    pub is_reconnecting: bool,
}

impl ConnectionStatus {
    /// Snapshot of a freshly constructed manager.
    pub fn initial(max_reconnect_attempts: u32) -> Self {
        Self {
            connected: false,
            status: ConnectionState::Disconnected,
            last_error: None,
            reconnect_attempts: 0,
            max_reconnect_attempts,
            is_reconnecting: false,
        }
    }
}
