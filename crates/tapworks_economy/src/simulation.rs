//! # Economy Simulation
//!
//! Folds a room's event history into its state at `room_time`, then steps
//! forward one millisecond at a time over the forecast horizon.
//!
//! ## Accounting
//!
//! ```text
//! balance(t) = 1000 * sum(increments with time <= t)
//!            - 1000 * sum(price(item, ordinal) for every purchase)
//!            + sum(power(item, ordinal) * (t - time) for purchases live at t)
//! ```
//!
//! A purchase is paid for the moment it is recorded, and starts producing at
//! its own `time`. All values here are exact; [`RoomStatus::to_wire`] is the
//! only place precision is dropped.

use std::collections::BTreeMap;

use num_bigint::BigInt;
use num_traits::Zero;

use tapworks_shared::protocol::{
    Building, GameStatus, ItemStatus, OnSale, PendingAdding, Schedule,
};

use crate::codec::compress;
use crate::error::EconomyResult;
use crate::formula::{ItemCatalog, ItemId, MILLI};
use crate::ledger::{Adding, Buying};

/// One point of the forecast timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Simulated time.
    pub time: i64,
    /// Balance in milli-currency.
    pub milli_currency: BigInt,
    /// Production per millisecond, milli-currency.
    pub total_power: BigInt,
}

/// A unit of an item going live during the forecast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildEvent {
    /// When it goes live.
    pub time: i64,
    /// Live units of the item after this step.
    pub built_count: u32,
    /// Production of the item's live units after this step.
    pub power: BigInt,
}

/// Per-item state at `room_time`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemSummary {
    /// Item.
    pub item_id: ItemId,
    /// Every recorded purchase, live or not.
    pub owned_count: u32,
    /// Purchases live at `room_time`.
    pub built_count: u32,
    /// Price of unit `owned_count + 1`, whole currency.
    pub next_price: BigInt,
    /// Production of the live units at `room_time`.
    pub power: BigInt,
    /// Units going live inside the horizon.
    pub building: Vec<BuildEvent>,
}

/// When an item's next unit becomes affordable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unlock {
    /// Already affordable at `room_time`.
    Now,
    /// First affordable at this simulated time.
    At(i64),
}

impl Unlock {
    /// Wire encoding: `0` for [`Unlock::Now`].
    #[must_use]
    pub const fn wire_time(self) -> i64 {
        match self {
            Self::Now => 0,
            Self::At(t) => t,
        }
    }
}

/// The derived state of a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomStatus {
    /// Time the fold was taken at.
    pub room_time: i64,
    /// Increments after `room_time`, ascending.
    pub pending: Vec<Adding>,
    /// Starts at `room_time`; then only steps where something was applied.
    pub schedule: Vec<ScheduleEntry>,
    /// Every catalog item, ascending id.
    pub items: Vec<ItemSummary>,
    /// Items affordable within the horizon, ascending id.
    pub unlocks: Vec<(ItemId, Unlock)>,
}

impl RoomStatus {
    /// Compresses the status for the wire, stamped with `time`.
    #[must_use]
    pub fn to_wire(&self, time: i64) -> GameStatus {
        GameStatus {
            time,
            adding: self
                .pending
                .iter()
                .map(|a| PendingAdding { time: a.time, amount: a.amount.to_string() })
                .collect(),
            schedule: self
                .schedule
                .iter()
                .map(|s| Schedule {
                    time: s.time,
                    milli_currency: compress(&s.milli_currency),
                    total_power: compress(&s.total_power),
                })
                .collect(),
            items: self
                .items
                .iter()
                .map(|item| ItemStatus {
                    item_id: item.item_id,
                    owned_count: item.owned_count,
                    built_count: item.built_count,
                    next_price: compress(&item.next_price),
                    power: compress(&item.power),
                    building: item
                        .building
                        .iter()
                        .map(|b| Building {
                            time: b.time,
                            built_count: b.built_count,
                            power: compress(&b.power),
                        })
                        .collect(),
                })
                .collect(),
            on_sale: self
                .unlocks
                .iter()
                .map(|&(item_id, unlock)| OnSale { item_id, time: unlock.wire_time() })
                .collect(),
        }
    }

    /// Balance at `room_time`.
    #[must_use]
    pub fn milli_currency(&self) -> Option<&BigInt> {
        self.schedule.first().map(|s| &s.milli_currency)
    }
}

#[derive(Default)]
struct Tally {
    owned: u32,
    built: u32,
    power: BigInt,
    building: Vec<BuildEvent>,
}

/// Folds `increments` and `purchases` at `room_time` and forecasts `horizon` ms.
///
/// # Errors
///
/// A purchase of an item missing from the catalog, or a formula exponent out
/// of range.
pub fn simulate(
    room_time: i64,
    catalog: &ItemCatalog,
    increments: &[Adding],
    purchases: &[Buying],
    horizon: i64,
) -> EconomyResult<RoomStatus> {
    let milli = BigInt::from(MILLI);
    let mut balance = BigInt::zero();
    let mut total_power = BigInt::zero();

    let mut tallies: BTreeMap<ItemId, Tally> =
        catalog.item_ids().map(|id| (id, Tally::default())).collect();
    let mut future_increments: BTreeMap<i64, BigInt> = BTreeMap::new();
    let mut future_purchases: BTreeMap<i64, Vec<Buying>> = BTreeMap::new();

    // Fold the past.
    for adding in increments {
        if adding.time <= room_time {
            balance += &adding.amount * &milli;
        } else {
            *future_increments.entry(adding.time).or_default() += &adding.amount;
        }
    }

    for buying in purchases {
        balance -= catalog.milli_price(buying.item_id, buying.ordinal)?;
        let tally = tallies.entry(buying.item_id).or_default();
        tally.owned += 1;

        if buying.time <= room_time {
            let power = catalog.power(buying.item_id, buying.ordinal)?;
            balance += &power * (room_time - buying.time);
            total_power += &power;
            tally.power += power;
            tally.built += 1;
        } else {
            future_purchases.entry(buying.time).or_default().push(*buying);
        }
    }

    // Snapshot at room_time.
    let mut prices: BTreeMap<ItemId, BigInt> = BTreeMap::new();
    let mut unlocks: BTreeMap<ItemId, Unlock> = BTreeMap::new();
    let mut items: Vec<ItemSummary> = Vec::with_capacity(tallies.len());
    for (&item_id, tally) in &tallies {
        let next_price = catalog.price(item_id, tally.owned + 1)?;
        let milli_price = &next_price * &milli;
        if balance >= milli_price {
            unlocks.insert(item_id, Unlock::Now);
        }
        prices.insert(item_id, milli_price);
        items.push(ItemSummary {
            item_id,
            owned_count: tally.owned,
            built_count: tally.built,
            next_price,
            power: tally.power.clone(),
            building: Vec::new(),
        });
    }

    let mut schedule = vec![ScheduleEntry {
        time: room_time,
        milli_currency: balance.clone(),
        total_power: total_power.clone(),
    }];

    // Forecast.
    for t in room_time + 1..=room_time.saturating_add(horizon) {
        balance += &total_power;
        let mut updated = false;

        if let Some(amount) = future_increments.get(&t) {
            balance += amount * &milli;
            updated = true;
        }

        if let Some(batch) = future_purchases.get(&t) {
            updated = true;
            let mut touched: Vec<ItemId> = Vec::new();
            for buying in batch {
                let power = catalog.power(buying.item_id, buying.ordinal)?;
                let tally = tallies.entry(buying.item_id).or_default();
                tally.built += 1;
                tally.power += &power;
                total_power += power;
                if !touched.contains(&buying.item_id) {
                    touched.push(buying.item_id);
                }
            }
            for item_id in touched {
                if let Some(tally) = tallies.get_mut(&item_id) {
                    let event =
                        BuildEvent { time: t, built_count: tally.built, power: tally.power.clone() };
                    tally.building.push(event);
                }
            }
        }

        if updated {
            schedule.push(ScheduleEntry {
                time: t,
                milli_currency: balance.clone(),
                total_power: total_power.clone(),
            });
        }

        for (item_id, price) in &prices {
            if !unlocks.contains_key(item_id) && balance >= *price {
                unlocks.insert(*item_id, Unlock::At(t));
            }
        }
    }

    for item in &mut items {
        if let Some(tally) = tallies.get_mut(&item.item_id) {
            item.building = std::mem::take(&mut tally.building);
        }
    }

    Ok(RoomStatus {
        room_time,
        pending: future_increments
            .into_iter()
            .map(|(time, amount)| Adding { time, amount })
            .collect(),
        schedule,
        items,
        unlocks: unlocks.into_iter().collect(),
    })
}

/// Balance in milli-currency at `time`, as used to validate a purchase.
///
/// Increments after `time` are ignored; every purchase is charged.
///
/// # Errors
///
/// A purchase of an unknown item, or a formula exponent out of range.
pub fn balance_at(
    time: i64,
    catalog: &ItemCatalog,
    increments: &[Adding],
    purchases: &[Buying],
) -> EconomyResult<BigInt> {
    let milli = BigInt::from(MILLI);
    let mut balance = BigInt::zero();

    for adding in increments.iter().filter(|a| a.time <= time) {
        balance += &adding.amount * &milli;
    }

    for buying in purchases {
        balance -= catalog.milli_price(buying.item_id, buying.ordinal)?;
        if buying.time <= time {
            balance += catalog.power(buying.item_id, buying.ordinal)? * (time - buying.time);
        }
    }

    Ok(balance)
}
