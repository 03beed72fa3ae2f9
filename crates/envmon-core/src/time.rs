//! Timestamp helpers.
//!
//! Everything on the wire is ISO-8601. Outbound timestamps are UTC with
//! millisecond precision; inbound ones are accepted either as RFC 3339 or as
//! the naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` form the backend emits, which is
//! read as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Current time as an RFC 3339 string, e.g. `2026-03-01T10:15:30.123Z`.
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// Format a timestamp the same way [`now_iso`] does.
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an inbound timestamp. Returns `None` for anything unrecognized.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
