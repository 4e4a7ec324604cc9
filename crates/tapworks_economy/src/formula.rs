//! # Item Formula Table
//!
//! Read-only catalog of production items. Both price and power follow
//!
//! ```text
//! value(x) = (c*x + 1) * d^(a*x + b)
//! ```
//!
//! evaluated exactly. Power is milli-currency per millisecond; price is whole
//! currency and gets scaled by [`MILLI`] before it is compared to a balance.
//!
//! ## Config Format
//!
//! ```toml
//! [[item]]
//! item_id = 1
//! power_a = 0
//! power_b = 1
//! power_c = 0
//! power_d = 1
//! price_a = 1
//! price_b = 1
//! price_c = 0
//! price_d = 2
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use num_bigint::BigInt;
use num_traits::One;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};

pub use tapworks_shared::protocol::ItemId;

/// Milli-currency per currency unit, as a factor for exact math.
pub const MILLI: u32 = tapworks_shared::MILLI_PER_UNIT;

/// Parameters of `(c*x + 1) * d^(a*x + b)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curve {
    /// Exponent slope.
    pub a: i64,
    /// Exponent offset.
    pub b: i64,
    /// Linear factor slope.
    pub c: i64,
    /// Base.
    pub d: i64,
}

impl Curve {
    /// Evaluates the curve at `x`.
    ///
    /// A non-positive exponent yields `d^0 = 1`.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::ExponentOutOfRange`] when `a*x + b` exceeds `u32`.
    pub fn eval(&self, item_id: ItemId, x: u32) -> EconomyResult<BigInt> {
        let x = i128::from(x);
        let exponent = i128::from(self.a) * x + i128::from(self.b);

        let scale = BigInt::from(i128::from(self.c) * x + 1);
        let growth = if exponent <= 0 {
            BigInt::one()
        } else {
            let exp = u32::try_from(exponent)
                .map_err(|_| EconomyError::ExponentOutOfRange { item_id, exponent })?;
            BigInt::from(self.d).pow(exp)
        };

        Ok(scale * growth)
    }
}

/// One catalog row, as stored in the item master file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFormula {
    /// Item id.
    pub item_id: ItemId,
    /// Power exponent slope.
    pub power_a: i64,
    /// Power exponent offset.
    pub power_b: i64,
    /// Power linear slope.
    pub power_c: i64,
    /// Power base.
    pub power_d: i64,
    /// Price exponent slope.
    pub price_a: i64,
    /// Price exponent offset.
    pub price_b: i64,
    /// Price linear slope.
    pub price_c: i64,
    /// Price base.
    pub price_d: i64,
}

impl ItemFormula {
    /// Power curve.
    #[must_use]
    pub const fn power_curve(&self) -> Curve {
        Curve { a: self.power_a, b: self.power_b, c: self.power_c, d: self.power_d }
    }

    /// Price curve.
    #[must_use]
    pub const fn price_curve(&self) -> Curve {
        Curve { a: self.price_a, b: self.price_b, c: self.price_c, d: self.price_d }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    item: Vec<ItemFormula>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Kind {
    Power,
    Price,
}

/// Immutable item table with a memo of evaluated values.
///
/// Evaluation is pure, so the memo never needs invalidation.
#[derive(Debug, Default)]
pub struct ItemCatalog {
    items: BTreeMap<ItemId, ItemFormula>,
    memo: RwLock<HashMap<(Kind, ItemId, u32), BigInt>>,
}

impl ItemCatalog {
    /// Builds a catalog from formula rows.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] on a duplicate item id.
    pub fn new(formulas: impl IntoIterator<Item = ItemFormula>) -> EconomyResult<Self> {
        let mut items = BTreeMap::new();
        for formula in formulas {
            if items.insert(formula.item_id, formula).is_some() {
                return Err(EconomyError::InvalidConfig(format!(
                    "duplicate item id {}",
                    formula.item_id
                )));
            }
        }
        Ok(Self { items, memo: RwLock::new(HashMap::new()) })
    }

    /// Parses a TOML catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] on malformed input.
    pub fn from_toml_str(source: &str) -> EconomyResult<Self> {
        let file: CatalogFile = toml::from_str(source)
            .map_err(|e| EconomyError::InvalidConfig(format!("item catalog: {e}")))?;
        Self::new(file.item)
    }

    /// Loads a TOML catalog from disk.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] if the file is unreadable or malformed.
    pub fn load(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_toml_str(&source)?;
        tracing::info!(items = catalog.len(), path = %path.display(), "item catalog loaded");
        Ok(catalog)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the catalog has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item ids in ascending order.
    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.keys().copied()
    }

    /// Looks up an item's formula.
    #[must_use]
    pub fn get(&self, item_id: ItemId) -> Option<&ItemFormula> {
        self.items.get(&item_id)
    }

    /// Returns true if the item exists.
    #[must_use]
    pub fn contains(&self, item_id: ItemId) -> bool {
        self.items.contains_key(&item_id)
    }

    /// Production per millisecond of the `count`-th unit, in milli-currency.
    ///
    /// # Errors
    ///
    /// Unknown item, or an exponent out of range.
    pub fn power(&self, item_id: ItemId, count: u32) -> EconomyResult<BigInt> {
        self.evaluate(Kind::Power, item_id, count)
    }

    /// Price of the `count`-th unit, in whole currency.
    ///
    /// # Errors
    ///
    /// Unknown item, or an exponent out of range.
    pub fn price(&self, item_id: ItemId, count: u32) -> EconomyResult<BigInt> {
        self.evaluate(Kind::Price, item_id, count)
    }

    /// Price of the `count`-th unit, in milli-currency.
    ///
    /// # Errors
    ///
    /// Unknown item, or an exponent out of range.
    pub fn milli_price(&self, item_id: ItemId, count: u32) -> EconomyResult<BigInt> {
        Ok(self.price(item_id, count)? * MILLI)
    }

    fn evaluate(&self, kind: Kind, item_id: ItemId, count: u32) -> EconomyResult<BigInt> {
        let key = (kind, item_id, count);
        if let Some(value) = self.memo.read().get(&key) {
            return Ok(value.clone());
        }

        let formula = self.items.get(&item_id).ok_or(EconomyError::UnknownItem(item_id))?;
        let curve = match kind {
            Kind::Power => formula.power_curve(),
            Kind::Price => formula.price_curve(),
        };
        let value = curve.eval(item_id, count)?;

        self.memo.write().insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_ten() -> ItemFormula {
        // price(x) = (0x+1) * 10^(0x+1) = 10
        ItemFormula {
            item_id: 1,
            power_a: 0,
            power_b: 0,
            power_c: 0,
            power_d: 1,
            price_a: 0,
            price_b: 1,
            price_c: 0,
            price_d: 10,
        }
    }

    #[test]
    fn test_flat_price() {
        let catalog = ItemCatalog::new([flat_ten()]).unwrap();
        assert_eq!(catalog.price(1, 1).unwrap(), BigInt::from(10));
        assert_eq!(catalog.price(1, 50).unwrap(), BigInt::from(10));
        assert_eq!(catalog.milli_price(1, 1).unwrap(), BigInt::from(10_000));
    }

    #[test]
    fn test_power_of_one_base() {
        let catalog = ItemCatalog::new([flat_ten()]).unwrap();
        assert_eq!(catalog.power(1, 0).unwrap(), BigInt::one());
    }

    #[test]
    fn test_curve_grows_past_u64() {
        let curve = Curve { a: 1, b: 0, c: 3, d: 7 };
        // (3*40+1) * 7^40
        let expected = BigInt::from(121) * BigInt::from(7).pow(40);
        assert_eq!(curve.eval(9, 40).unwrap(), expected);
        assert!(expected > BigInt::from(u64::MAX));
    }

    #[test]
    fn test_negative_exponent_is_one() {
        let curve = Curve { a: 1, b: -5, c: 0, d: 3 };
        assert_eq!(curve.eval(1, 2).unwrap(), BigInt::one());
    }

    #[test]
    fn test_exponent_out_of_range() {
        let curve = Curve { a: i64::MAX, b: 0, c: 0, d: 2 };
        assert!(matches!(
            curve.eval(4, 2),
            Err(EconomyError::ExponentOutOfRange { item_id: 4, .. })
        ));
    }

    #[test]
    fn test_unknown_item() {
        let catalog = ItemCatalog::new([flat_ten()]).unwrap();
        assert_eq!(catalog.price(2, 1), Err(EconomyError::UnknownItem(2)));
    }

    #[test]
    fn test_duplicate_item_rejected() {
        assert!(matches!(
            ItemCatalog::new([flat_ten(), flat_ten()]),
            Err(EconomyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_toml() {
        let catalog = ItemCatalog::from_toml_str(
            r"
            [[item]]
            item_id = 2
            power_a = 0
            power_b = 1
            power_c = 1
            power_d = 2
            price_a = 1
            price_b = 0
            price_c = 0
            price_d = 3

            [[item]]
            item_id = 1
            power_a = 0
            power_b = 0
            power_c = 0
            power_d = 1
            price_a = 0
            price_b = 1
            price_c = 0
            price_d = 10
            ",
        )
        .unwrap();

        assert_eq!(catalog.item_ids().collect::<Vec<_>>(), vec![1, 2]);
        // (1*4+1) * 2^1
        assert_eq!(catalog.power(2, 4).unwrap(), BigInt::from(10));
        // 3^5
        assert_eq!(catalog.price(2, 5).unwrap(), BigInt::from(243));
    }

    #[test]
    fn test_memo_returns_same_value() {
        let catalog = ItemCatalog::new([flat_ten()]).unwrap();
        let first = catalog.price(1, 3).unwrap();
        let second = catalog.price(1, 3).unwrap();
        assert_eq!(first, second);
    }
}
