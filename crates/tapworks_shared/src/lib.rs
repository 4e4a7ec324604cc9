//! # TAPWORKS Shared
//!
//! Wire types used by both the room server and its clients.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - the big-integer stack (values arrive here already compressed)
//! - any storage or transport crate
//!
//! If you need exact arithmetic, put it in `tapworks_economy`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod protocol;

pub use constants::{
    BROADCAST_INTERVAL_MS, DEFAULT_BIND, FORECAST_HORIZON_MS, MANTISSA_DIGITS, MILLI_PER_UNIT,
    WS_PATH_PREFIX,
};
pub use protocol::{
    Building, Exponential, GameAction, GameRequest, GameResponse, GameStatus, ItemStatus, OnSale,
    PendingAdding, Schedule, ServerMessage,
};
