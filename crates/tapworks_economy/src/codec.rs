//! # Exponent Codec
//!
//! Lossy compression of exact integers into [`Exponential`] for the wire.
//!
//! ## Rules
//!
//! - Up to 15 decimal digits: sent as-is, exponent 0
//! - Longer: the leading 15 digits, exponent = digit count - 15
//! - Trailing digits are dropped, never rounded
//!
//! One-way. The engine never reads an [`Exponential`] back.

use num_bigint::{BigInt, Sign};

pub use tapworks_shared::Exponential;
use tapworks_shared::MANTISSA_DIGITS;

/// Compresses `n` to `(mantissa, exponent)`.
#[must_use]
pub fn compress(n: &BigInt) -> Exponential {
    let digits = n.magnitude().to_str_radix(10);

    let (head, exponent) = if digits.len() <= MANTISSA_DIGITS {
        (digits.as_str(), 0)
    } else {
        (&digits[..MANTISSA_DIGITS], digits.len() - MANTISSA_DIGITS)
    };

    // At most 15 ASCII digits: always fits an i64.
    let magnitude = head.bytes().fold(0i64, |acc, b| acc * 10 + i64::from(b - b'0'));
    let mantissa = if n.sign() == Sign::Minus { -magnitude } else { magnitude };

    Exponential { mantissa, exponent: i64::try_from(exponent).unwrap_or(i64::MAX) }
}

/// Reconstructs the approximate value `mantissa * 10^exponent`.
#[must_use]
pub fn expand(value: Exponential) -> BigInt {
    let exponent = u32::try_from(value.exponent.max(0)).unwrap_or(u32::MAX);
    BigInt::from(value.mantissa) * BigInt::from(10).pow(exponent)
}
