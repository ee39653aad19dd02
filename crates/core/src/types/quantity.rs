//! Non-negative unit counts.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use serde::{Deserialize, Serialize};

/// A count of units on a cart row or threshold.
///
/// Negative counts cannot be represented; signed input from the UI goes
/// through [`Quantity::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// Zero units.
    pub const ZERO: Self = Self(0);

    /// Create a quantity.
    #[must_use]
    pub const fn new(units: u32) -> Self {
        Self(units)
    }

    /// Create a quantity from signed input, clamping negatives to zero and
    /// saturating at `u32::MAX`.
    #[must_use]
    pub fn clamped(units: i64) -> Self {
        Self(u32::try_from(units.max(0)).unwrap_or(u32::MAX))
    }

    /// Number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this is zero units.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Units missing to reach `target`, zero when already there.
    #[must_use]
    pub const fn remaining_to(self, target: Self) -> Self {
        Self(target.0.saturating_sub(self.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Quantity {
    fn from(units: u32) -> Self {
        Self(units)
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
