//! # Protocol Constants
//!
//! Values both sides of the socket must agree on.

// =============================================================================
// ECONOMY
// =============================================================================

/// Milli-currency per display currency unit.
pub const MILLI_PER_UNIT: u32 = 1000;

/// Default forecast window, in milliseconds (one simulation step per ms).
pub const FORECAST_HORIZON_MS: i64 = 1000;

/// Significant decimal digits kept by the exponent codec.
pub const MANTISSA_DIGITS: usize = 15;

// =============================================================================
// NETWORK
// =============================================================================

/// Period of the unsolicited status broadcast.
pub const BROADCAST_INTERVAL_MS: u64 = 500;

/// Default server bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Path prefix of the per-room WebSocket endpoint (`/ws/<room>`).
pub const WS_PATH_PREFIX: &str = "/ws/";
