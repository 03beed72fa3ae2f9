//! # envmon-core
//!
//! Foundation pieces shared by every envmon crate:
//!
//! - **Constants**: production endpoint, default timings, close codes
//! - **Backoff**: reconnect delay math with symmetric jitter
//! - **Time**: ISO-8601 timestamps as the dashboard backend expects them
//! - **Logging**: `tracing` subscriber bootstrap plus capture helpers for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod logging;
pub mod retry;
pub mod time;
