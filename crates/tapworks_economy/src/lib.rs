//! # TAPWORKS Economy
//!
//! The room economy engine: exact currency accounting for many independent
//! rooms, each folding its increment and purchase history into a current
//! balance and a short forecast.
//!
//! ## Design Principles
//!
//! 1. **Exact arithmetic** - currency and power are arbitrary precision
//! 2. **Event sourced** - room state is always derived from the ledger
//! 3. **One lock per room** - rooms never contend with each other
//! 4. **External configuration** - the item catalog is a TOML file
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tapworks_economy::{Economy, ItemCatalog, MemoryLedger};
//!
//! let catalog = Arc::new(ItemCatalog::load("data/items.toml")?);
//! let economy = Economy::new(catalog, Arc::new(MemoryLedger::new()));
//!
//! economy.apply_increment("room", &"100".parse()?, now)?;
//! let status = economy.get_status("room")?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod codec;
pub mod engine;
pub mod error;
pub mod formula;
pub mod journal;
pub mod ledger;
pub mod locks;
pub mod simulation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{compress, expand, Exponential};
pub use engine::{parse_amount, Economy};
pub use error::{EconomyError, EconomyResult, Outcome, Rejection};
pub use formula::{Curve, ItemCatalog, ItemFormula, ItemId, MILLI};
pub use journal::{JournalEntry, JournalLedger};
pub use ledger::{Adding, Buying, LedgerStore, MemoryLedger};
pub use locks::{RoomCursor, RoomLocks, RoomSlot};
pub use simulation::{balance_at, simulate, BuildEvent, ItemSummary, RoomStatus, ScheduleEntry, Unlock};
