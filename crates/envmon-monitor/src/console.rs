//! Console rendering of connection events.

use std::io::Write;
use std::sync::Arc;

use envmon_link::{ConnectionEvent, Listener, StatusEvent};
use envmon_sensors::{Payload, SensorReading, classify};

/// How events are written to stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// One line of text per event.
    Human,
    /// The raw event as a JSON line.
    JsonLines,
}

/// Listener printing every event to stdout.
pub fn listener(mode: OutputMode) -> Listener {
    Arc::new(move |event: &ConnectionEvent| {
        let Some(line) = render(event, mode) else {
            return;
        };
        let mut stdout = std::io::stdout().lock();
        // a closed pipe is not worth tearing the link down for
        let _ = writeln!(stdout, "{line}");
    })
}

/// The line printed for `event`, if any.
pub fn render(event: &ConnectionEvent, mode: OutputMode) -> Option<String> {
    match mode {
        OutputMode::JsonLines => serde_json::to_string(event).ok(),
        OutputMode::Human => match event {
            ConnectionEvent::Status(status) => Some(render_status(status)),
            ConnectionEvent::Telemetry(payload) => match classify(payload) {
                Payload::Reading(reading) => Some(render_reading(&reading)),
                Payload::Welcome { message, .. } => Some(format!("[server] {message}")),
                Payload::ServerError { message } => Some(format!("[server error] {message}")),
                Payload::Malformed(err) => Some(format!("[skipped] {err}")),
                Payload::Acknowledgement { .. } | Payload::Other => None,
            },
        },
    }
}

fn render_status(status: &StatusEvent) -> String {
    let mut line = format!("[{}] {}", status.status, status.message);
    if let Some(code) = status.code {
        line.push_str(&format!(" (code {code})"));
    }
    if let Some(error) = &status.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

fn render_reading(reading: &SensorReading) -> String {
    format!(
        "{}  temperature {:.1}°C  humidity {:.1}%  obstacle {}",
        reading.timestamp_iso(),
        reading.temperature,
        reading.humidity,
        if reading.obstacle { "yes" } else { "no" },
    )
}
