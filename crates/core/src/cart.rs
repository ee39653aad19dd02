//! The shopping cart.
//!
//! A [`Cart`] is an ordered collection of [`LineItem`] rows keyed by row ID.
//! A product sold per phone model gets one row per `(product, model)` pair;
//! simple products get a single row. Rows with zero units are never kept.
//!
//! Every visitor mutation returns a [`CartChange`] describing what happened so the
//! caller can forward it to the analytics log. Aggregates are derived from
//! the rows on each call and never cached.

use serde::{Deserialize, Serialize};

use crate::pricing::{ResolvedPrice, TierKind, TierSchedule};
use crate::types::{CartEventKind, LineItemId, ModelId, Price, ProductId, Quantity};

/// One cart row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Row identifier, distinct from the product ID.
    pub id: LineItemId,
    /// Owning product.
    pub product_id: ProductId,
    /// Phone model, for products sold per model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<ModelId>,
    /// Product display name.
    pub name: String,
    /// Secondary display line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subname: Option<String>,
    /// Model display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Units on this row; always positive inside a [`Cart`].
    pub quantity: Quantity,
    /// Retail price and wholesale tiers.
    #[serde(flatten)]
    pub pricing: TierSchedule,
}

impl LineItem {
    /// Price resolution at the current quantity.
    #[must_use]
    pub fn resolved(&self) -> ResolvedPrice {
        self.pricing.resolve(self.quantity)
    }

    /// Unit price paid at the current quantity.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        self.resolved().unit_price
    }

    /// Resolved unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price().times(self.quantity)
    }

    /// What the buyer saves on this row against retail.
    #[must_use]
    pub fn savings(&self) -> Price {
        let resolved = self.resolved();
        if resolved.tier.is_none() {
            return Price::ZERO;
        }
        (self.pricing.unit_price - resolved.unit_price).times(self.quantity)
    }

    fn key_matches(&self, product_id: &ProductId, model_id: Option<&ModelId>) -> bool {
        &self.product_id == product_id && self.model_id.as_ref() == model_id
    }
}

/// What to add to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    /// Owning product.
    pub product_id: ProductId,
    /// Phone model, for products sold per model.
    #[serde(default)]
    pub model_id: Option<ModelId>,
    /// Product display name.
    pub name: String,
    /// Secondary display line.
    #[serde(default)]
    pub subname: Option<String>,
    /// Model display name.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Units to add.
    pub quantity: Quantity,
    /// Retail price and wholesale tiers.
    #[serde(flatten)]
    pub pricing: TierSchedule,
}

impl NewLineItem {
    /// A simple product with retail pricing.
    #[must_use]
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        quantity: Quantity,
        pricing: TierSchedule,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            model_id: None,
            name: name.into(),
            subname: None,
            model_name: None,
            image: None,
            quantity,
            pricing,
        }
    }

    /// Attach a phone model.
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<ModelId>, model_name: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self.model_name = Some(model_name.into());
        self
    }
}

/// A mutation applied to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartChange {
    /// Kind of mutation.
    pub kind: CartEventKind,
    /// Affected row.
    pub line_id: LineItemId,
    /// Affected product.
    pub product_id: ProductId,
    /// Units left on the row after the mutation (zero when it was deleted).
    pub quantity: Quantity,
}

/// Aggregates over the whole cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    /// Sum of resolved line totals.
    pub subtotal: Price,
    /// Sum of quantities.
    pub items_count: Quantity,
    /// Discount against retail across all rows.
    pub savings: Price,
}

/// A "buy more, save more" prompt for a row below one of its tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeHint {
    /// Row the hint is for.
    pub line_id: LineItemId,
    /// Product of that row.
    pub product_id: ProductId,
    /// Tier the row could reach.
    pub tier: TierKind,
    /// Units still needed.
    pub units_needed: Quantity,
    /// Unit price inside that tier.
    pub tier_price: Price,
    /// Savings against retail once the tier is reached at its threshold.
    pub potential_savings: Price,
}

/// The shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct Cart {
    rows: Vec<LineItem>,
}

impl From<Vec<LineItem>> for Cart {
    /// Rebuild a cart from stored rows, dropping empty rows and merging rows
    /// that share a `(product, model)` pair.
    fn from(rows: Vec<LineItem>) -> Self {
        let mut cart = Self::default();
        for row in rows.into_iter().filter(|r| !r.quantity.is_zero()) {
            match cart
                .rows
                .iter_mut()
                .find(|r| r.key_matches(&row.product_id, row.model_id.as_ref()))
            {
                Some(existing) => existing.quantity = existing.quantity + row.quantity,
                None => cart.rows.push(row),
            }
        }
        cart
    }
}

impl From<Cart> for Vec<LineItem> {
    fn from(cart: Cart) -> Self {
        cart.rows
    }
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.rows
    }

    /// Look up a row.
    #[must_use]
    pub fn get(&self, id: &LineItemId) -> Option<&LineItem> {
        self.rows.iter().find(|r| &r.id == id)
    }

    /// Whether the cart has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add units of a product (or product model).
    ///
    /// Increments the existing row for the same `(product, model)` pair, or
    /// creates a row with a fresh ID. Adding zero units to a product not yet
    /// in the cart does nothing.
    pub fn add_item(&mut self, item: NewLineItem) -> Option<CartChange> {
        if let Some(existing) = self
            .rows
            .iter_mut()
            .find(|r| r.key_matches(&item.product_id, item.model_id.as_ref()))
        {
            existing.quantity = existing.quantity + item.quantity;
            return Some(CartChange {
                kind: CartEventKind::Add,
                line_id: existing.id.clone(),
                product_id: existing.product_id.clone(),
                quantity: existing.quantity,
            });
        }

        if item.quantity.is_zero() {
            return None;
        }

        let row = LineItem {
            id: LineItemId::generate(),
            product_id: item.product_id,
            model_id: item.model_id,
            name: item.name,
            subname: item.subname,
            model_name: item.model_name,
            image: item.image,
            quantity: item.quantity,
            pricing: item.pricing,
        };
        let change = CartChange {
            kind: CartEventKind::Add,
            line_id: row.id.clone(),
            product_id: row.product_id.clone(),
            quantity: row.quantity,
        };
        self.rows.push(row);
        Some(change)
    }

    /// Replace a row's quantity; zero deletes the row.
    ///
    /// Returns `None` if no row has this ID.
    pub fn update_quantity(&mut self, id: &LineItemId, quantity: Quantity) -> Option<CartChange> {
        let index = self.rows.iter().position(|r| &r.id == id)?;

        let product_id = if quantity.is_zero() {
            self.rows.remove(index).product_id
        } else {
            let row = self.rows.get_mut(index)?;
            row.quantity = quantity;
            row.product_id.clone()
        };

        Some(CartChange {
            kind: CartEventKind::Update,
            line_id: id.clone(),
            product_id,
            quantity,
        })
    }

    /// Delete a row outright.
    ///
    /// Returns `None` if no row has this ID.
    pub fn remove_item(&mut self, id: &LineItemId) -> Option<CartChange> {
        let index = self.rows.iter().position(|r| &r.id == id)?;
        let row = self.rows.remove(index);
        Some(CartChange {
            kind: CartEventKind::Remove,
            line_id: row.id,
            product_id: row.product_id,
            quantity: Quantity::ZERO,
        })
    }

    /// Take `quantity` units off the row for a `(product, model)` pair,
    /// deleting the row when nothing is left. Units added since the order
    /// was built stay in the cart.
    ///
    /// Returns `false` if no row matches.
    pub fn deduct(&mut self, product_id: &ProductId, model_id: Option<&ModelId>, quantity: Quantity) -> bool {
        let Some(index) = self.rows.iter().position(|r| r.key_matches(product_id, model_id)) else {
            return false;
        };
        let Some(row) = self.rows.get_mut(index) else {
            return false;
        };
        row.quantity = quantity.remaining_to(row.quantity);
        if row.quantity.is_zero() {
            self.rows.remove(index);
        }
        true
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Sum of resolved line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.rows.iter().map(LineItem::line_total).sum()
    }

    /// Total units across all rows.
    #[must_use]
    pub fn items_count(&self) -> Quantity {
        self.rows.iter().map(|r| r.quantity).sum()
    }

    /// Total discount against retail.
    #[must_use]
    pub fn savings(&self) -> Price {
        self.rows.iter().map(LineItem::savings).sum()
    }

    /// All aggregates at once.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            subtotal: self.subtotal(),
            items_count: self.items_count(),
            savings: self.savings(),
        }
    }

    /// Rows that hold some units but have not reached a cheaper tier yet.
    #[must_use]
    pub fn eligible_upgrades(&self) -> Vec<UpgradeHint> {
        self.rows
            .iter()
            .filter(|r| !r.quantity.is_zero())
            .filter_map(|row| {
                let (tier, schedule) = row.pricing.next_tier(row.quantity)?;
                let potential_savings =
                    (row.pricing.unit_price - schedule.price).times(schedule.min_quantity);
                Some(UpgradeHint {
                    line_id: row.id.clone(),
                    product_id: row.product_id.clone(),
                    tier,
                    units_needed: row.quantity.remaining_to(schedule.min_quantity),
                    tier_price: schedule.price,
                    potential_savings,
                })
            })
            .collect()
    }
}
