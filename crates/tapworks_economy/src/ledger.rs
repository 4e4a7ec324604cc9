//! # Ledger Store
//!
//! Per-room record of the two event kinds the economy is built from:
//!
//! - [`Adding`]: currency added at an instant, unique per `(room, time)`
//! - [`Buying`]: the `ordinal`-th unit of an item, going live at `time`
//!
//! The store does no arithmetic. Accumulating an increment is a
//! read-modify-write done by the caller while holding the room lock.
//!
//! ## Orderings
//!
//! ```text
//! increments: room -> time -> amount        (get/set by time, range by time)
//! purchases:  room -> [(time, item, ordinal)] (scan by time, count by item)
//! ```

use std::collections::{BTreeMap, HashMap};

use num_bigint::BigInt;
use parking_lot::RwLock;

use crate::error::EconomyResult;
use crate::formula::ItemId;

/// Currency added to a room at an instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adding {
    /// Millisecond timestamp.
    pub time: i64,
    /// Whole currency units.
    pub amount: BigInt,
}

impl Adding {
    /// Creates an increment.
    #[must_use]
    pub fn new(time: i64, amount: impl Into<BigInt>) -> Self {
        Self { time, amount: amount.into() }
    }
}

/// A purchased unit of an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Buying {
    /// Item bought.
    pub item_id: ItemId,
    /// 1-based sequence number among this room's units of the item.
    pub ordinal: u32,
    /// When the unit goes live.
    pub time: i64,
}

/// Key-ordered backing store for room events.
///
/// Implementations must be safe to share between threads and between
/// server processes; isolation beyond a single call is provided by the
/// room lock, not by the store.
pub trait LedgerStore: Send + Sync {
    /// Increment recorded at exactly `time`, if any.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn get_increment(&self, room: &str, time: i64) -> EconomyResult<Option<BigInt>>;

    /// Records `amount` at `time`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn set_increment(&self, room: &str, time: i64, amount: &BigInt) -> EconomyResult<()>;

    /// Increments with `time <= through`, ascending.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn increments_through(&self, room: &str, through: i64) -> EconomyResult<Vec<Adding>>;

    /// Increments with `time > after`, ascending.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn increments_after(&self, room: &str, after: i64) -> EconomyResult<Vec<Adding>>;

    /// Every increment of the room, ascending.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn all_increments(&self, room: &str) -> EconomyResult<Vec<Adding>> {
        self.increments_through(room, i64::MAX)
    }

    /// Deletes increments with `time <= through`.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn delete_increments_through(&self, room: &str, through: i64) -> EconomyResult<()>;

    /// Replaces every increment with `time <= through` by one increment of
    /// `total` at `through`, atomically.
    ///
    /// Either the whole replacement is visible or none of it is.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure; the ledger is unchanged.
    fn compact_increments(&self, room: &str, through: i64, total: &BigInt) -> EconomyResult<()>;

    /// Appends a purchase. No merge semantics.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn append_purchase(&self, room: &str, buying: Buying) -> EconomyResult<()>;

    /// Every purchase of the room, by time (insertion order on ties).
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn purchases_by_time(&self, room: &str) -> EconomyResult<Vec<Buying>>;

    /// Number of purchases of `item_id` in the room.
    ///
    /// # Errors
    ///
    /// [`crate::EconomyError::Store`] on I/O failure.
    fn count_purchases(&self, room: &str, item_id: ItemId) -> EconomyResult<u32>;
}

/// One room's events.
#[derive(Clone, Debug, Default)]
pub struct RoomLedger {
    increments: BTreeMap<i64, BigInt>,
    purchases: Vec<Buying>,
}

impl RoomLedger {
    fn collect(range: impl Iterator<Item = (i64, BigInt)>) -> Vec<Adding> {
        range.map(|(time, amount)| Adding { time, amount }).collect()
    }

    fn through(&self, through: i64) -> Vec<Adding> {
        Self::collect(self.increments.range(..=through).map(|(t, a)| (*t, a.clone())))
    }

    fn after(&self, after: i64) -> Vec<Adding> {
        if after == i64::MAX {
            return Vec::new();
        }
        Self::collect(self.increments.range(after + 1..).map(|(t, a)| (*t, a.clone())))
    }

    fn delete_through(&mut self, through: i64) {
        if through == i64::MAX {
            self.increments.clear();
        } else {
            self.increments = self.increments.split_off(&(through + 1));
        }
    }

    fn compact(&mut self, through: i64, total: BigInt) {
        self.delete_through(through);
        self.increments.insert(through, total);
    }

    fn append(&mut self, buying: Buying) {
        // Keep time order; equal times stay in insertion order.
        let at = self.purchases.partition_point(|b| b.time <= buying.time);
        self.purchases.insert(at, buying);
    }

    fn count(&self, item_id: ItemId) -> u32 {
        let n = self.purchases.iter().filter(|b| b.item_id == item_id).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

/// In-process ledger. Never fails.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    rooms: RwLock<HashMap<String, RoomLedger>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with at least one event.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Names of every room the ledger has seen, sorted.
    #[must_use]
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Replaces everything recorded for `room`.
    pub fn restore_room(&self, room: &str, increments: Vec<Adding>, purchases: Vec<Buying>) {
        let mut restored = RoomLedger {
            increments: increments.into_iter().map(|a| (a.time, a.amount)).collect(),
            purchases: Vec::with_capacity(purchases.len()),
        };
        for buying in purchases {
            restored.append(buying);
        }
        self.rooms.write().insert(room.to_string(), restored);
    }

    fn read<T>(&self, room: &str, f: impl FnOnce(&RoomLedger) -> T) -> T {
        let rooms = self.rooms.read();
        match rooms.get(room) {
            Some(ledger) => f(ledger),
            None => f(&RoomLedger::default()),
        }
    }

    fn write<T>(&self, room: &str, f: impl FnOnce(&mut RoomLedger) -> T) -> T {
        let mut rooms = self.rooms.write();
        f(rooms.entry(room.to_string()).or_default())
    }
}

impl LedgerStore for MemoryLedger {
    fn get_increment(&self, room: &str, time: i64) -> EconomyResult<Option<BigInt>> {
        Ok(self.read(room, |l| l.increments.get(&time).cloned()))
    }

    fn set_increment(&self, room: &str, time: i64, amount: &BigInt) -> EconomyResult<()> {
        self.write(room, |l| l.increments.insert(time, amount.clone()));
        Ok(())
    }

    fn increments_through(&self, room: &str, through: i64) -> EconomyResult<Vec<Adding>> {
        Ok(self.read(room, |l| l.through(through)))
    }

    fn increments_after(&self, room: &str, after: i64) -> EconomyResult<Vec<Adding>> {
        Ok(self.read(room, |l| l.after(after)))
    }

    fn delete_increments_through(&self, room: &str, through: i64) -> EconomyResult<()> {
        self.write(room, |l| l.delete_through(through));
        Ok(())
    }

    fn compact_increments(&self, room: &str, through: i64, total: &BigInt) -> EconomyResult<()> {
        self.write(room, |l| l.compact(through, total.clone()));
        Ok(())
    }

    fn append_purchase(&self, room: &str, buying: Buying) -> EconomyResult<()> {
        self.write(room, |l| l.append(buying));
        Ok(())
    }

    fn purchases_by_time(&self, room: &str) -> EconomyResult<Vec<Buying>> {
        Ok(self.read(room, |l| l.purchases.clone()))
    }

    fn count_purchases(&self, room: &str, item_id: ItemId) -> EconomyResult<u32> {
        Ok(self.read(room, |l| l.count(item_id)))
    }
}
