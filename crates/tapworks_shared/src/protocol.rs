//! Wire protocol types shared between client and server.
//!
//! Every frame is a JSON text message. Large integers never travel
//! exactly: they are compressed into an [`Exponential`] by the server.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Item type identifier.
pub type ItemId = u32;

/// Millisecond timestamp.
pub type Millis = i64;

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// A request sent by a client on its room socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRequest {
    /// Client-chosen id echoed back in the [`GameResponse`].
    pub request_id: u64,
    /// When the client wants the action to take effect.
    pub time: Millis,
    /// What to do.
    #[serde(flatten)]
    pub action: GameAction,
}

/// The mutation a request asks for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GameAction {
    /// Add whole currency units (decimal string, arbitrary size).
    AddCurrency {
        /// Amount to add.
        amount: String,
    },
    /// Buy the next unit of an item.
    BuyItem {
        /// Item to buy.
        item_id: ItemId,
        /// How many the client believes the room already owns.
        owned_count: u32,
    },
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Acknowledgement for a single request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResponse {
    /// Id of the request being answered.
    pub request_id: u64,
    /// Whether the mutation was applied.
    pub is_success: bool,
}

/// Any frame the server writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Full room status.
    Status(GameStatus),
    /// Request acknowledgement.
    Response(GameResponse),
}

/// Lossy decimal scientific notation: `mantissa * 10^exponent`.
///
/// Serialized as the two-element array `[mantissa, exponent]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Exponential {
    /// Leading significant digits.
    pub mantissa: i64,
    /// Power of ten applied to the mantissa.
    pub exponent: i64,
}

impl Exponential {
    /// Zero.
    pub const ZERO: Self = Self { mantissa: 0, exponent: 0 };

    /// Creates a value from its parts.
    #[inline]
    #[must_use]
    pub const fn new(mantissa: i64, exponent: i64) -> Self {
        Self { mantissa, exponent }
    }
}

impl Serialize for Exponential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.mantissa, self.exponent).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Exponential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (mantissa, exponent) = <(i64, i64)>::deserialize(deserializer)?;
        Ok(Self { mantissa, exponent })
    }
}

/// The room's economic state, recomputed on every broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    /// Server time the status was stamped with.
    pub time: Millis,
    /// Increments scheduled after the room's current time.
    pub adding: Vec<PendingAdding>,
    /// State changes over the forecast horizon, starting at the room's current time.
    pub schedule: Vec<Schedule>,
    /// Per-item summary.
    pub items: Vec<ItemStatus>,
    /// Items whose next unit becomes affordable within the horizon.
    pub on_sale: Vec<OnSale>,
}

/// An increment that has not been consumed yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAdding {
    /// When it applies.
    pub time: Millis,
    /// Whole currency units, decimal.
    pub amount: String,
}

/// A point on the forecast timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Simulated time.
    pub time: Millis,
    /// Balance in milli-currency.
    pub milli_currency: Exponential,
    /// Production per millisecond, in milli-currency.
    pub total_power: Exponential,
}

/// Per-item summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    /// Item id.
    pub item_id: ItemId,
    /// Purchases recorded, including ones not yet live.
    pub owned_count: u32,
    /// Purchases live at the room's current time.
    pub built_count: u32,
    /// Price of the next unit, whole currency.
    pub next_price: Exponential,
    /// Production of the live units at the room's current time.
    pub power: Exponential,
    /// Units going live inside the horizon.
    pub building: Vec<Building>,
}

/// A unit going live during the forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// When it goes live.
    pub time: Millis,
    /// Live units of the item after this one.
    pub built_count: u32,
    /// Production of all live units of the item after this one.
    pub power: Exponential,
}

/// When an item's next unit becomes affordable. `time == 0` means "now".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnSale {
    /// Item id.
    pub item_id: ItemId,
    /// Unlock time, or 0 when already affordable.
    pub time: Millis,
}
