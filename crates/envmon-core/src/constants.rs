//! Default endpoint, timings and WebSocket close codes.

/// Production telemetry endpoint.
pub const DEFAULT_TELEMETRY_URL: &str = "wss://envirosense-2khv.onrender.com/api/v1/sensor/ws";

/// Telemetry endpoint of a locally running backend.
pub const LOCAL_TELEMETRY_URL: &str = "ws://localhost:8000/api/v1/sensor/ws";

/// Query parameter carrying the identity on the channel URL.
pub const DEFAULT_IDENTITY_PARAM: &str = "email";

/// How long a channel may stay in `connecting` before it is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Interval between heartbeat pings on an open channel.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Consecutive failed reconnects before the manager gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Bound on queued outbound frames per channel.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Readings retained by the telemetry cache.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
