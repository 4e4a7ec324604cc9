//! # Economy Error Types
//!
//! Two families: hard errors ([`EconomyError`]) abort an operation and are safe
//! to retry; validation failures ([`Rejection`]) are normal game outcomes and
//! leave the room untouched.

use thiserror::Error;

use crate::formula::ItemId;

/// Errors that can occur in the economy engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Item not found in the catalog.
    #[error("item not found: {0}")]
    UnknownItem(ItemId),

    /// A formula exponent does not fit a machine word.
    #[error("exponent {exponent} out of range for item {item_id}")]
    ExponentOutOfRange {
        /// The item whose formula was evaluated.
        item_id: ItemId,
        /// The offending exponent.
        exponent: i128,
    },

    /// A client-supplied amount is not a non-negative decimal integer.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backing store I/O failed. The operation was aborted; retry is safe.
    #[error("ledger store failure: {0}")]
    Store(String),

    /// The journal on disk could not be read back.
    #[error("journal corrupt: {0}")]
    Journal(String),

    /// A status query hit the room time guard.
    #[error("room refused: {0}")]
    Rejected(#[from] Rejection),
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;

/// Why a mutation was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The room cursor is ahead of the wall clock (clock skew between hosts).
    #[error("room time {room_time} is ahead of now {now}")]
    RoomTimeAhead {
        /// Room cursor.
        room_time: i64,
        /// Wall clock.
        now: i64,
    },

    /// The request asks for a time that has already passed.
    #[error("request time {request_time} is before now {now}")]
    RequestTimeInPast {
        /// Requested time.
        request_time: i64,
        /// Wall clock.
        now: i64,
    },

    /// The client's owned count is stale.
    #[error("item {item_id}: client owns {claimed}, room owns {actual}")]
    StaleOwnedCount {
        /// Item.
        item_id: ItemId,
        /// Count the client sent.
        claimed: u32,
        /// Count on record.
        actual: u32,
    },

    /// The balance at the request time does not cover the price.
    #[error("item {item_id}: insufficient funds for unit {ordinal}")]
    InsufficientFunds {
        /// Item.
        item_id: ItemId,
        /// Unit that was being bought.
        ordinal: u32,
    },
}

/// Outcome of a mutation that did not hit a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Applied; the room cursor now reads this time.
    Applied {
        /// New room time.
        room_time: i64,
    },
    /// Refused; the room is unchanged.
    Rejected(Rejection),
}

impl Outcome {
    /// Returns true if the mutation was applied.
    #[inline]
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
