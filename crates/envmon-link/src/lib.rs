//! # envmon-link
//!
//! The telemetry connection manager: a persistent WebSocket client that
//! survives an unreliable network.
//!
//! - [`ConnectionManager`]: cloneable handle to a single actor task that owns
//!   the channel, its timers and the reconnect scheduler
//! - [`ConnectionEvent`]: what listeners receive (status changes and
//!   telemetry payloads)
//! - [`Connector`]: transport seam; [`WsConnector`] is the `tokio-tungstenite`
//!   implementation
//! - [`IdentitySource`]: fallback lookup of the identity used to reopen the
//!   channel

#![deny(unsafe_code)]

mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod listeners;
pub mod manager;
pub mod protocol;
pub mod state;
mod timer;
pub mod transport;

#[cfg(test)]
mod mock;

pub use config::LinkConfig;
pub use error::{FailureKind, LinkError, Result};
pub use event::{ConnectionEvent, StatusEvent};
pub use identity::{IdentitySource, NoIdentity};
pub use listeners::{Listener, ListenerRegistry, ListenerRemover};
pub use manager::{ConnectionManager, WeakConnectionManager};
pub use state::{ConnectionState, ConnectionStatus};
pub use transport::{ChannelIo, Connector, InboundFrame, OutboundFrame, WsConnector};
