//! # Per-Room Serialization
//!
//! One mutex per room. Every economy operation on a room runs while holding
//! that room's lock; operations on different rooms never wait on each other.
//!
//! ```text
//! RoomLocks (RwLock<HashMap>)
//!   "alpha" -> Arc<Mutex<RoomCursor>>
//!   "beta"  -> Arc<Mutex<RoomCursor>>
//! ```
//!
//! The registry only takes its write lock the first time a room is seen.
//! Entries are never evicted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Rejection;

/// The room time cursor, guarded by the room lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoomCursor {
    /// Last time an operation ran in this room, in milliseconds. 0 before the first.
    pub room_time: i64,
}

impl RoomCursor {
    /// Advances the cursor to `now` for a client mutation dated `request_time`.
    ///
    /// Refuses when the cursor is already ahead of `now`, or when
    /// `request_time` lies before `now`. On refusal the cursor is unchanged.
    ///
    /// # Errors
    ///
    /// The [`Rejection`] describing which check failed.
    pub fn advance(&mut self, request_time: i64, now: i64) -> Result<i64, Rejection> {
        if request_time < now {
            self.check_behind(now)?;
            return Err(Rejection::RequestTimeInPast { request_time, now });
        }
        self.advance_for_read(now)
    }

    /// Advances the cursor to `now` for a status read, which carries no request time.
    ///
    /// # Errors
    ///
    /// [`Rejection::RoomTimeAhead`] when the cursor is already past `now`.
    pub fn advance_for_read(&mut self, now: i64) -> Result<i64, Rejection> {
        self.check_behind(now)?;
        self.room_time = now;
        Ok(now)
    }

    fn check_behind(&self, now: i64) -> Result<(), Rejection> {
        if self.room_time > now {
            return Err(Rejection::RoomTimeAhead { room_time: self.room_time, now });
        }
        Ok(())
    }
}

/// One room's lock. `slot.lock()` gives exclusive access until the guard drops.
pub type RoomSlot = Arc<Mutex<RoomCursor>>;

/// Registry of room locks.
#[derive(Debug, Default)]
pub struct RoomLocks {
    rooms: RwLock<HashMap<String, Arc<Mutex<RoomCursor>>>>,
}

impl RoomLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The room's lock, created on first use.
    #[must_use]
    pub fn slot(&self, room: &str) -> RoomSlot {
        if let Some(slot) = self.rooms.read().get(room) {
            return Arc::clone(slot);
        }
        // Another thread may have inserted between the two locks.
        let mut rooms = self.rooms.write();
        Arc::clone(rooms.entry(room.to_string()).or_default())
    }

    /// Number of rooms seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Returns true if no room has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}
