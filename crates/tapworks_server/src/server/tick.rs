//! # Broadcast Ticker
//!
//! Fixed-period status broadcast for one session.
//!
//! ## Design
//!
//! The session never sleeps on the ticker. It reads the client with a
//! timeout of [`BroadcastTicker::time_until_due`], so a tick and a request
//! are never handled at the same time.

use std::time::{Duration, Instant};

/// Fixed-period tick controller.
#[derive(Debug)]
pub struct BroadcastTicker {
    /// Tick period.
    interval: Duration,
    /// When the next tick is due.
    next_due: Instant,
    /// Statistics.
    stats: TickStats,
}

/// Tick statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks fired.
    pub ticks: u64,
    /// Ticks fired more than one full period late.
    pub late_ticks: u64,
}

impl BroadcastTicker {
    /// Creates a ticker whose first tick is one period from now.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// Creates a ticker whose first tick is one period after `start`.
    #[must_use]
    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self { interval, next_due: start + interval, stats: TickStats::default() }
    }

    /// Time left before the next tick, zero when due.
    #[must_use]
    pub fn time_until_due(&self) -> Duration {
        self.time_until_due_at(Instant::now())
    }

    /// Same as [`Self::time_until_due`], measured at `now`.
    #[must_use]
    pub fn time_until_due_at(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Returns true if a tick is due.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.time_until_due().is_zero()
    }

    /// Consumes the due tick and schedules the next one.
    ///
    /// Missed ticks are dropped, not replayed: after a stall the next tick is
    /// one period from `now`.
    pub fn fire_at(&mut self, now: Instant) {
        self.stats.ticks += 1;
        self.next_due += self.interval;
        if self.next_due <= now {
            self.stats.late_ticks += 1;
            self.next_due = now + self.interval;
        }
    }

    /// [`Self::fire_at`] with the current time.
    pub fn fire(&mut self) {
        self.fire_at(Instant::now());
    }

    /// Tick period.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns tick statistics.
    #[must_use]
    pub const fn stats(&self) -> TickStats {
        self.stats
    }
}
