//! Type-safe price representation using decimal arithmetic.
//!
//! All catalog prices are in Brazilian Real. Amounts are kept as
//! [`Decimal`] so tier comparisons and line totals never pick up
//! floating-point drift.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Quantity;

/// A unit or aggregate price in BRL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero reais.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from an amount in centavos.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: Quantity) -> Self {
        Self(self.0 * Decimal::from(quantity.get()))
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Format for display, e.g. `R$ 1.234,50`.
    #[must_use]
    pub fn display(self) -> String {
        let rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        let text = format!("{:.2}", rounded.abs());
        let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        format!("{sign}R$ {grouped},{cents}")
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times_quantity() {
        let unit = Price::from_cents(750);
        assert_eq!(unit.times(Quantity::new(50)), Price::from_cents(37_500));
        assert_eq!(unit.times(Quantity::ZERO), Price::ZERO);
    }

    #[test]
    fn test_display_brl() {
        assert_eq!(Price::from_cents(1250).display(), "R$ 12,50");
        assert_eq!(Price::from_cents(123_450).display(), "R$ 1.234,50");
        assert_eq!(Price::from_cents(100_000_000).display(), "R$ 1.000.000,00");
        assert_eq!(Price::ZERO.display(), "R$ 0,00");
        assert_eq!(Price::from_cents(-500).display(), "-R$ 5,00");
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&Price::from_cents(799)).unwrap();
        assert_eq!(json, "\"7.99\"");
        let back: Price = serde_json::from_str("\"7.99\"").unwrap();
        assert_eq!(back, Price::from_cents(799));
    }

    #[test]
    fn test_sum() {
        let total: Price = [Price::from_cents(100), Price::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_cents(350));
    }
}
