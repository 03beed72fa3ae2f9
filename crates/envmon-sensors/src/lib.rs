//! # envmon-sensors
//!
//! Sensor-side view of the telemetry stream.
//!
//! - [`SensorReading`]: one temperature / humidity / obstacle sample, decoded
//!   leniently from whatever the backend sends
//! - [`classify`]: sorts inbound payloads into readings, acknowledgements,
//!   greetings and server errors
//! - [`TelemetryCache`]: a listener that keeps the latest reading, a bounded
//!   history and the connection health

#![deny(unsafe_code)]

pub mod cache;
pub mod classify;
pub mod error;
pub mod reading;

pub use cache::{DEFAULT_HISTORY_CAPACITY, TelemetryCache, TelemetrySnapshot};
pub use classify::{Payload, classify};
pub use error::{Result, SensorError};
pub use reading::SensorReading;
