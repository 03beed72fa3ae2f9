//! Link error taxonomy.
//!
//! None of these are returned to callers of the manager; they travel inside
//! status events (`error` + `errorKind`) or end up in the log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the telemetry channel.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The channel could not be opened (refused, DNS, handshake, timeout).
    #[error("connect failed: {0}")]
    Connect(String),
    /// An open channel broke (socket error, write failure).
    #[error("transport failure: {0}")]
    Transport(String),
    /// An inbound payload was not a JSON object.
    #[error("malformed payload: {0}")]
    Protocol(String),
    /// The reconnect budget is spent.
    #[error("gave up after {0} reconnect attempts")]
    Exhausted(u32),
    /// Nothing to connect with (no identity, bad endpoint).
    #[error("{0}")]
    Config(String),
}

/// Serializable classification of a [`LinkError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// See [`LinkError::Connect`].
    Connect,
    /// See [`LinkError::Transport`].
    Transport,
    /// See [`LinkError::Protocol`].
    Protocol,
    /// See [`LinkError::Exhausted`].
    Exhausted,
    /// See [`LinkError::Config`].
    Config,
}

impl LinkError {
    /// Classification carried in status events.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connect(_) => FailureKind::Connect,
            Self::Transport(_) => FailureKind::Transport,
            Self::Protocol(_) => FailureKind::Protocol,
            Self::Exhausted(_) => FailureKind::Exhausted,
            Self::Config(_) => FailureKind::Config,
        }
    }
}

/// Result type for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
