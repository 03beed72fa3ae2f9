//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EnvmonSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `ENVMON_*` overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::EnvmonSettings;

/// The `~/.envmon` directory.
pub fn envmon_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".envmon")
}

/// Resolve the path to the settings file (`~/.envmon/settings.json`).
pub fn settings_path() -> PathBuf {
    envmon_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EnvmonSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<EnvmonSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<EnvmonSettings> {
    let defaults = serde_json::to_value(EnvmonSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ENVMON_*` process environment overrides.
pub fn apply_env_overrides(settings: &mut EnvmonSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
///
/// Invalid values are logged and ignored, keeping the file/default value.
pub fn apply_overrides_from<F>(settings: &mut EnvmonSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Link ────────────────────────────────────────────────────────
    if let Some(v) = env.string("ENVMON_URL") {
        settings.link.url = v;
    }
    if let Some(v) = env.string("ENVMON_IDENTITY_PARAM") {
        settings.link.identity_param = v;
    }
    if let Some(v) = env.u64_in("ENVMON_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.link.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("ENVMON_HEARTBEAT_INTERVAL_MS", 1_000, 3_600_000) {
        settings.link.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64_in("ENVMON_RECONNECT_BASE_MS", 1, 3_600_000) {
        settings.link.reconnect.base_interval_ms = v;
    }
    if let Some(v) = env.u64_in("ENVMON_RECONNECT_MAX_MS", 1, 3_600_000) {
        settings.link.reconnect.max_interval_ms = v;
    }
    if let Some(v) = env.u32_in("ENVMON_MAX_RECONNECT_ATTEMPTS", 1, 1_000) {
        settings.link.max_reconnect_attempts = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ENVMON_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("ENVMON_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ENVMON_SESSION_FILE") {
        settings.session.session_file = Some(v);
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, expected = kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "boolean", parse_bool)
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "integer in range", |v| parse_u64_range(v, min, max))
    }

    fn u32_in(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, "integer in range", |v| parse_u32_range(v, min, max))
    }
}
