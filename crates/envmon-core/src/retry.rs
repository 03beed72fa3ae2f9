//! Reconnect backoff configuration and delay calculation.
//!
//! The manager's reconnect scheduler lives in `envmon-link`; this module
//! holds the pure math so it can be tested without a runtime:
//!
//! - [`BackoffConfig`]: base interval, cap and jitter
//! - [`nominal_delay_ms`]: `min(max, base × 1.5^(attempt−1))`
//! - [`reconnect_delay_ms_with_random`]: the nominal delay with ±jitter

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base interval in milliseconds.
pub const DEFAULT_BASE_INTERVAL_MS: u64 = 5_000;
/// Default cap on the nominal delay in milliseconds.
pub const DEFAULT_MAX_INTERVAL_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;
/// Growth factor between consecutive attempts.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Parameters of the reconnect backoff curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Delay before the first reconnect in ms (default: 5000).
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Cap on the nominal delay in ms (default: 30000).
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Symmetric jitter 0.0–1.0 (default: 0.2, i.e. ±20%).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_base_interval_ms() -> u64 {
    DEFAULT_BASE_INTERVAL_MS
}
fn default_max_interval_ms() -> u64 {
    DEFAULT_MAX_INTERVAL_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: DEFAULT_BASE_INTERVAL_MS,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffConfig {
    /// Nominal (jitter-free) delay for a 1-based attempt number.
    pub fn nominal_delay_ms(&self, attempt: u32) -> u64 {
        nominal_delay_ms(attempt, self.base_interval_ms, self.max_interval_ms)
    }

    /// Delay for `attempt` using a caller-supplied random value in `[0, 1)`.
    pub fn delay_ms_with_random(&self, attempt: u32, random: f64) -> u64 {
        reconnect_delay_ms_with_random(
            attempt,
            self.base_interval_ms,
            self.max_interval_ms,
            self.jitter_factor,
            random,
        )
    }

    /// Delay for `attempt` drawn with the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms_with_random(attempt, rand::random::<f64>()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delay calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Nominal delay: `min(max_interval, base_interval × 1.5^(attempt−1))`.
///
/// `attempt` is 1-based; 0 is treated as 1.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn nominal_delay_ms(attempt: u32, base_interval_ms: u64, max_interval_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(128) as i32;
    let grown = base_interval_ms as f64 * BACKOFF_MULTIPLIER.powi(exponent);
    grown.min(max_interval_ms as f64).round() as u64
}

/// Nominal delay with symmetric jitter applied.
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG. A jitter factor of
/// 0.2 spreads the result over `[0.8 × nominal, 1.2 × nominal]`. The result
/// never goes below zero.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn reconnect_delay_ms_with_random(
    attempt: u32,
    base_interval_ms: u64,
    max_interval_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let nominal = nominal_delay_ms(attempt, base_interval_ms, max_interval_ms) as f64;
    let jitter_factor = jitter_factor.clamp(0.0, 1.0);
    let random = random.clamp(0.0, 1.0);
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    (nominal * jitter).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults() {
        let config = BackoffConfig::default();
        assert_eq!(config.base_interval_ms, 5_000);
        assert_eq!(config.max_interval_ms, 30_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: BackoffConfig = serde_json::from_str(r#"{"baseIntervalMs": 100}"#).unwrap();
        assert_eq!(config.base_interval_ms, 100);
        assert_eq!(config.max_interval_ms, DEFAULT_MAX_INTERVAL_MS);
    }

    #[test]
    fn nominal_curve_grows_by_half() {
        assert_eq!(nominal_delay_ms(1, 5_000, 30_000), 5_000);
        assert_eq!(nominal_delay_ms(2, 5_000, 30_000), 7_500);
        assert_eq!(nominal_delay_ms(3, 5_000, 30_000), 11_250);
        assert_eq!(nominal_delay_ms(4, 5_000, 30_000), 16_875);
        assert_eq!(nominal_delay_ms(5, 5_000, 30_000), 25_313);
    }

    #[test]
    fn nominal_caps_at_max() {
        assert_eq!(nominal_delay_ms(6, 5_000, 30_000), 30_000);
        assert_eq!(nominal_delay_ms(u32::MAX, 5_000, 30_000), 30_000);
    }

    #[test]
    fn attempt_zero_behaves_like_first() {
        assert_eq!(nominal_delay_ms(0, 5_000, 30_000), 5_000);
    }

    #[test]
    fn random_midpoint_is_nominal() {
        assert_eq!(reconnect_delay_ms_with_random(2, 5_000, 30_000, 0.2, 0.5), 7_500);
    }

    #[test]
    fn random_extremes_hit_jitter_edges() {
        assert_eq!(reconnect_delay_ms_with_random(1, 5_000, 30_000, 0.2, 0.0), 4_000);
        assert_eq!(reconnect_delay_ms_with_random(1, 5_000, 30_000, 0.2, 1.0), 6_000);
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let config = BackoffConfig {
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        };
        assert_eq!(config.delay(3), Duration::from_millis(11_250));
    }

    #[test]
    fn zero_base_never_negative() {
        assert_eq!(reconnect_delay_ms_with_random(4, 0, 30_000, 1.0, 0.0), 0);
    }

    proptest! {
        #[test]
        fn delay_within_jitter_band(attempt in 1u32..40, random in 0.0f64..1.0) {
            let nominal = nominal_delay_ms(attempt, 5_000, 30_000) as f64;
            let delay = reconnect_delay_ms_with_random(attempt, 5_000, 30_000, 0.2, random) as f64;
            prop_assert!(delay >= (nominal * 0.8).floor());
            prop_assert!(delay <= (nominal * 1.2).ceil());
        }

        #[test]
        fn nominal_is_monotonic(attempt in 1u32..60) {
            prop_assert!(nominal_delay_ms(attempt, 5_000, 30_000) <= nominal_delay_ms(attempt + 1, 5_000, 30_000));
        }
    }
}
