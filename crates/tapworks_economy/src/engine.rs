//! # Economy Engine
//!
//! The process-wide context every session talks to. It owns the item catalog,
//! the ledger store, the room locks and the clock, and runs each operation
//! inside the room's lock:
//!
//! ```text
//! lock(room) -> advance cursor -> read / validate / write ledger -> release
//! ```
//!
//! Status queries hold the lock for their whole run: compaction of consumed
//! increments, the ledger snapshot and the simulation.

use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::Zero;

use tapworks_shared::{GameStatus, FORECAST_HORIZON_MS};

use crate::clock::{Clock, SystemClock};
use crate::error::{EconomyError, EconomyResult, Outcome, Rejection};
use crate::formula::{ItemCatalog, ItemId};
use crate::ledger::{Adding, Buying, LedgerStore};
use crate::locks::RoomLocks;
use crate::simulation::{balance_at, simulate, RoomStatus};

/// Parses a client amount: a non-empty run of ASCII digits.
///
/// # Errors
///
/// [`EconomyError::InvalidAmount`] for anything else, including a sign.
pub fn parse_amount(amount: &str) -> EconomyResult<BigInt> {
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EconomyError::InvalidAmount(amount.to_string()));
    }
    amount.parse().map_err(|_| EconomyError::InvalidAmount(amount.to_string()))
}

/// Shared economy context.
pub struct Economy {
    catalog: Arc<ItemCatalog>,
    ledger: Arc<dyn LedgerStore>,
    locks: RoomLocks,
    clock: Arc<dyn Clock>,
    horizon: i64,
}

impl std::fmt::Debug for Economy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Economy")
            .field("items", &self.catalog.len())
            .field("rooms", &self.locks.len())
            .field("horizon", &self.horizon)
            .finish_non_exhaustive()
    }
}

impl Economy {
    /// Creates a context on the system clock with the default horizon.
    #[must_use]
    pub fn new(catalog: Arc<ItemCatalog>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            catalog,
            ledger,
            locks: RoomLocks::new(),
            clock: Arc::new(SystemClock),
            horizon: FORECAST_HORIZON_MS,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the forecast horizon in milliseconds.
    #[must_use]
    pub fn with_horizon(mut self, horizon: i64) -> Self {
        self.horizon = horizon.max(0);
        self
    }

    /// The item catalog.
    #[must_use]
    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    /// Forecast horizon in milliseconds.
    #[must_use]
    pub const fn horizon(&self) -> i64 {
        self.horizon
    }

    /// Current room time cursor (0 for a room never touched).
    #[must_use]
    pub fn room_time(&self, room: &str) -> i64 {
        self.locks.slot(room).lock().room_time
    }

    /// Adds `amount` whole currency units at `time`.
    ///
    /// Increments at the same instant accumulate.
    ///
    /// # Errors
    ///
    /// Store failures. The room lock is released either way.
    pub fn apply_increment(&self, room: &str, amount: &BigInt, time: i64) -> EconomyResult<Outcome> {
        let slot = self.locks.slot(room);
        let mut cursor = slot.lock();
        let room_time = match cursor.advance(time, self.clock.now_ms()) {
            Ok(t) => t,
            Err(reason) => return Ok(reject(room, "increment", reason)),
        };

        let current = self.ledger.get_increment(room, time)?.unwrap_or_else(BigInt::zero);
        self.ledger.set_increment(room, time, &(current + amount))?;

        tracing::debug!(room, time, %amount, "increment applied");
        Ok(Outcome::Applied { room_time })
    }

    /// Buys unit `owned_count + 1` of `item_id`, live from `time`.
    ///
    /// # Errors
    ///
    /// Unknown item, formula overflow, or store failure. The room lock is
    /// released either way.
    pub fn apply_purchase(
        &self,
        room: &str,
        item_id: ItemId,
        owned_count: u32,
        time: i64,
    ) -> EconomyResult<Outcome> {
        if !self.catalog.contains(item_id) {
            return Err(EconomyError::UnknownItem(item_id));
        }

        let slot = self.locks.slot(room);
        let mut cursor = slot.lock();
        let room_time = match cursor.advance(time, self.clock.now_ms()) {
            Ok(t) => t,
            Err(reason) => return Ok(reject(room, "purchase", reason)),
        };

        let actual = self.ledger.count_purchases(room, item_id)?;
        if actual != owned_count {
            let reason = Rejection::StaleOwnedCount { item_id, claimed: owned_count, actual };
            return Ok(reject(room, "purchase", reason));
        }

        let increments = self.ledger.increments_through(room, time)?;
        let purchases = self.ledger.purchases_by_time(room)?;
        let balance = balance_at(time, &self.catalog, &increments, &purchases)?;

        let ordinal = owned_count + 1;
        if balance < self.catalog.milli_price(item_id, ordinal)? {
            return Ok(reject(room, "purchase", Rejection::InsufficientFunds { item_id, ordinal }));
        }

        self.ledger.append_purchase(room, Buying { item_id, ordinal, time })?;

        tracing::debug!(room, item_id, ordinal, time, "purchase applied");
        Ok(Outcome::Applied { room_time })
    }

    /// Room state at the room's current time, exact.
    ///
    /// Consumed increments are compacted into one at the cursor first. The
    /// room lock is held until the simulation finishes.
    ///
    /// # Errors
    ///
    /// [`EconomyError::Rejected`] when the room time is ahead of the clock;
    /// store or formula failures otherwise.
    pub fn room_status(&self, room: &str) -> EconomyResult<RoomStatus> {
        let slot = self.locks.slot(room);
        let mut cursor = slot.lock();
        let room_time = cursor.advance_for_read(self.clock.now_ms())?;

        let past = self.ledger.increments_through(room, room_time)?;
        let compacted = matches!(past.as_slice(), [only] if only.time == room_time);
        if !past.is_empty() && !compacted {
            let total: BigInt = past.iter().map(|a| &a.amount).sum();
            self.ledger.compact_increments(room, room_time, &total)?;
            tracing::debug!(room, room_time, merged = past.len(), "increments compacted");
        }

        let increments = self.ledger.all_increments(room)?;
        let purchases = self.ledger.purchases_by_time(room)?;
        simulate(room_time, &self.catalog, &increments, &purchases, self.horizon)
    }

    /// Room state compressed for the wire, stamped with a fresh clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`Economy::room_status`].
    pub fn get_status(&self, room: &str) -> EconomyResult<GameStatus> {
        let status = self.room_status(room)?;
        Ok(status.to_wire(self.clock.now_ms()))
    }

    /// Every increment currently on record for the room.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn increments(&self, room: &str) -> EconomyResult<Vec<Adding>> {
        let slot = self.locks.slot(room);
        let _guard = slot.lock();
        self.ledger.all_increments(room)
    }
}

fn reject(room: &str, op: &str, reason: Rejection) -> Outcome {
    tracing::warn!(room, op, %reason, "operation rejected");
    Outcome::Rejected(reason)
}
