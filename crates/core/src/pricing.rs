//! Tiered wholesale pricing.
//!
//! A product has a retail ("varejo") unit price and up to two volume tiers:
//! a *special* wholesale tier and a deeper *super wholesale* tier, each with
//! its own quantity threshold. [`resolve_price`] picks the unit price a row
//! pays at its current quantity.
//!
//! Resolution rules:
//! - A tier is active when its threshold is positive and the quantity has
//!   reached it.
//! - When several tiers are active, the cheapest wins, regardless of which
//!   tier is nominally "higher".
//! - The resolved price never exceeds the unit price, so buying more never
//!   costs more per unit.

use serde::{Deserialize, Serialize};

use crate::types::{Price, Quantity};

/// Which discount tier a price comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TierKind {
    /// First wholesale tier.
    Special,
    /// Second, typically deeper, wholesale tier.
    SuperWholesale,
}

/// A volume tier: `price` applies once the row holds `min_quantity` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    /// Unit price inside the tier.
    pub price: Price,
    /// Units needed to enter the tier.
    pub min_quantity: Quantity,
}

impl PriceTier {
    /// Create a tier.
    #[must_use]
    pub const fn new(price: Price, min_quantity: Quantity) -> Self {
        Self {
            price,
            min_quantity,
        }
    }

    /// Whether `quantity` qualifies for this tier. A zero threshold never
    /// activates.
    #[must_use]
    pub fn is_active(&self, quantity: Quantity) -> bool {
        !self.min_quantity.is_zero() && quantity >= self.min_quantity
    }
}

/// Pricing inputs for one sellable unit (product or product model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSchedule {
    /// Retail unit price.
    pub unit_price: Price,
    /// Special wholesale tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<PriceTier>,
    /// Super wholesale tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_wholesale: Option<PriceTier>,
}

/// The outcome of resolving a schedule at a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrice {
    /// Unit price to charge.
    pub unit_price: Price,
    /// The tier that produced it, `None` for retail.
    pub tier: Option<TierKind>,
}

impl TierSchedule {
    /// Retail-only schedule.
    #[must_use]
    pub const fn retail(unit_price: Price) -> Self {
        Self {
            unit_price,
            special: None,
            super_wholesale: None,
        }
    }

    /// Add a special wholesale tier.
    #[must_use]
    pub fn with_special(mut self, price: Price, min_quantity: Quantity) -> Self {
        self.special = Some(PriceTier::new(price, min_quantity));
        self
    }

    /// Add a super wholesale tier.
    #[must_use]
    pub fn with_super_wholesale(mut self, price: Price, min_quantity: Quantity) -> Self {
        self.super_wholesale = Some(PriceTier::new(price, min_quantity));
        self
    }

    /// Configured tiers in threshold order.
    pub fn tiers(&self) -> impl Iterator<Item = (TierKind, PriceTier)> {
        let mut tiers: Vec<(TierKind, PriceTier)> = [
            self.special.map(|t| (TierKind::Special, t)),
            self.super_wholesale.map(|t| (TierKind::SuperWholesale, t)),
        ]
        .into_iter()
        .flatten()
        .filter(|(_, t)| !t.min_quantity.is_zero())
        .collect();
        tiers.sort_by_key(|(_, t)| t.min_quantity);
        tiers.into_iter()
    }

    /// Resolve the unit price at `quantity`.
    #[must_use]
    pub fn resolve(&self, quantity: Quantity) -> ResolvedPrice {
        let best_tier = self
            .tiers()
            .filter(|(_, tier)| tier.is_active(quantity))
            .min_by_key(|(_, tier)| tier.price);

        match best_tier {
            Some((kind, tier)) if tier.price < self.unit_price => ResolvedPrice {
                unit_price: tier.price,
                tier: Some(kind),
            },
            _ => ResolvedPrice {
                unit_price: self.unit_price,
                tier: None,
            },
        }
    }

    /// The cheapest tier not yet reached at `quantity` that would lower the
    /// price below what `quantity` already pays.
    #[must_use]
    pub fn next_tier(&self, quantity: Quantity) -> Option<(TierKind, PriceTier)> {
        let current = self.resolve(quantity).unit_price;
        self.tiers()
            .filter(|(_, tier)| !tier.is_active(quantity) && tier.price < current)
            .min_by_key(|(_, tier)| tier.min_quantity)
    }
}

/// Unit price for `quantity` units under `schedule`.
#[must_use]
pub fn resolve_price(schedule: &TierSchedule, quantity: Quantity) -> Price {
    schedule.resolve(quantity).unit_price
}
