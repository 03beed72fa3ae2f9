//! # envmon-settings
//!
//! Configuration for the envmon workspace, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`EnvmonSettings::default()`]
//! 2. **User file**: `~/.envmon/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ENVMON_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, envmon_home, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{EnvmonSettings, LinkSettings, LoggingSettings, SessionSettings};
