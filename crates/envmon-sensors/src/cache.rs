//! Telemetry cache.
//!
//! A listener that folds the event stream into what a dashboard shows: the
//! latest reading, a short history ordered by sample time, and whether the
//! link is healthy.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use envmon_link::{
    ConnectionEvent, ConnectionManager, ConnectionState, Listener, ListenerRemover, StatusEvent,
};

use crate::classify::{Payload, classify};
use crate::reading::SensorReading;

pub use envmon_core::constants::DEFAULT_HISTORY_CAPACITY;

/// Point-in-time copy of the cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Most recently received reading.
    pub latest: Option<SensorReading>,
    /// Readings in ascending timestamp order, oldest dropped first.
    pub history: Vec<SensorReading>,
    /// Whether the link is currently connected.
    pub connected: bool,
    /// Last connection problem, cleared once the link reconnects.
    pub error: Option<String>,
}

/// Shared, cloneable telemetry cache.
#[derive(Clone, Debug)]
pub struct TelemetryCache {
    state: Arc<RwLock<TelemetrySnapshot>>,
    capacity: usize,
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TelemetryCache {
    /// Empty cache keeping at most `capacity` readings (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(TelemetrySnapshot::default())),
            capacity: capacity.max(1),
        }
    }

    /// History bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register with `manager`. Dropping the cache does not unregister it;
    /// call [`ListenerRemover::remove`] for that.
    pub fn attach(&self, manager: &ConnectionManager) -> ListenerRemover {
        manager.add_listener(self.listener())
    }

    /// The cache as a bare listener.
    pub fn listener(&self) -> Listener {
        let cache = self.clone();
        Arc::new(move |event: &ConnectionEvent| cache.apply(event))
    }

    /// Fold one event into the cache.
    pub fn apply(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Status(status) => self.apply_status(status),
            ConnectionEvent::Telemetry(payload) => match classify(payload) {
                Payload::Reading(reading) => self.record(reading),
                Payload::Malformed(err) => warn!(error = %err, "ignoring undecodable reading"),
                other => debug!(payload = ?other, "non-reading payload"),
            },
        }
    }

    /// Load an initial history, e.g. from a backfill query. Merged with
    /// anything already cached, sorted and bounded.
    pub fn seed(&self, readings: impl IntoIterator<Item = SensorReading>) {
        let mut state = self.state.write();
        state.history.extend(readings);
        state.history.sort_by_key(|reading| reading.timestamp);
        trim(&mut state.history, self.capacity);
        if state.latest.is_none() {
            state.latest = state.history.last().cloned();
        }
    }

    /// Most recently received reading.
    pub fn latest(&self) -> Option<SensorReading> {
        self.state.read().latest.clone()
    }

    /// Cached readings, oldest first.
    pub fn history(&self) -> Vec<SensorReading> {
        self.state.read().history.clone()
    }

    /// Whether the link is connected.
    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Current connection problem, if any.
    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// Copy of everything.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.state.read().clone()
    }

    fn apply_status(&self, status: &StatusEvent) {
        let mut state = self.state.write();
        state.connected = status.status == ConnectionState::Connected;
        if status.status.is_problem() {
            state.error = Some(problem_message(status));
        } else if status.status == ConnectionState::Connected {
            state.error = None;
        }
    }

    fn record(&self, reading: SensorReading) {
        let mut state = self.state.write();
        let at = state
            .history
            .partition_point(|cached| cached.timestamp <= reading.timestamp);
        state.history.insert(at, reading.clone());
        trim(&mut state.history, self.capacity);
        state.latest = Some(reading);
    }
}

fn problem_message(status: &StatusEvent) -> String {
    if !status.message.is_empty() {
        return status.message.clone();
    }
    let detail = status
        .error
        .as_deref()
        .unwrap_or("Unable to connect to sensor data");
    format!("Connection error: {detail}")
}

fn trim(history: &mut Vec<SensorReading>, capacity: usize) {
    if history.len() > capacity {
        let excess = history.len() - capacity;
        let _ = history.drain(..excess);
    }
}
