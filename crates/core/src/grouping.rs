//! Display grouping of cart rows.
//!
//! Products sold per phone model are shown as one group with a per-model
//! breakdown; simple products are shown on their own. A product is grouped
//! when it has two or more rows, or when its single row carries a model.

use serde::Serialize;

use crate::cart::{Cart, LineItem};
use crate::types::{Price, ProductId, Quantity};

/// One entry of the grouped cart view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CartGroup {
    /// A simple product row.
    Single {
        /// The row.
        item: LineItem,
    },
    /// All rows of a product sold per model.
    #[serde(rename_all = "camelCase")]
    Variants {
        /// Shared product.
        product_id: ProductId,
        /// Product display name, taken from the first row.
        name: String,
        /// Product image, taken from the first row that has one.
        image: Option<String>,
        /// Rows in cart order.
        variants: Vec<LineItem>,
        /// Sum of the rows' quantities.
        total_quantity: Quantity,
        /// Sum of the rows' resolved line totals.
        total_price: Price,
    },
}

impl CartGroup {
    /// Product this entry belongs to.
    #[must_use]
    pub fn product_id(&self) -> &ProductId {
        match self {
            Self::Single { item } => &item.product_id,
            Self::Variants { product_id, .. } => product_id,
        }
    }

    /// Units in this entry.
    #[must_use]
    pub fn total_quantity(&self) -> Quantity {
        match self {
            Self::Single { item } => item.quantity,
            Self::Variants { total_quantity, .. } => *total_quantity,
        }
    }

    /// Resolved price of this entry.
    #[must_use]
    pub fn total_price(&self) -> Price {
        match self {
            Self::Single { item } => item.line_total(),
            Self::Variants { total_price, .. } => *total_price,
        }
    }
}

/// Group the cart's rows by product, keeping first-appearance order.
#[must_use]
pub fn group_items(cart: &Cart) -> Vec<CartGroup> {
    let mut buckets: Vec<(ProductId, Vec<LineItem>)> = Vec::new();
    for row in cart.items() {
        match buckets.iter_mut().find(|(id, _)| id == &row.product_id) {
            Some((_, rows)) => rows.push(row.clone()),
            None => buckets.push((row.product_id.clone(), vec![row.clone()])),
        }
    }

    buckets
        .into_iter()
        .map(|(product_id, mut rows)| {
            if rows.len() == 1
                && rows.first().is_some_and(|r| r.model_id.is_none())
                && let Some(item) = rows.pop()
            {
                return CartGroup::Single { item };
            }

            let name = rows.first().map(|r| r.name.clone()).unwrap_or_default();
            let image = rows.iter().find_map(|r| r.image.clone());
            let total_quantity = rows.iter().map(|r| r.quantity).sum();
            let total_price = rows.iter().map(LineItem::line_total).sum();
            CartGroup::Variants {
                product_id,
                name,
                image,
                variants: rows,
                total_quantity,
                total_price,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::NewLineItem;
    use crate::pricing::TierSchedule;

    fn pricing() -> TierSchedule {
        TierSchedule::retail(Price::from_cents(1000))
            .with_special(Price::from_cents(800), Quantity::new(20))
    }

    #[test]
    fn test_two_models_form_one_group() {
        let mut cart = Cart::new();
        cart.add_item(
            NewLineItem::new("P1", "Capinha", Quantity::new(12), pricing())
                .with_model("m1", "iPhone 15"),
        );
        cart.add_item(
            NewLineItem::new("P1", "Capinha", Quantity::new(25), pricing())
                .with_model("m2", "Galaxy S24"),
        );

        let groups = group_items(&cart);
        assert_eq!(groups.len(), 1);
        let group = groups.first().unwrap();
        assert!(matches!(group, CartGroup::Variants { variants, .. } if variants.len() == 2));
        assert_eq!(group.total_quantity(), Quantity::new(37));
        // 12 * 10.00 + 25 * 8.00
        assert_eq!(group.total_price(), Price::from_cents(32_000));
    }

    #[test]
    fn test_simple_product_is_ungrouped() {
        let mut cart = Cart::new();
        cart.add_item(NewLineItem::new("P2", "Cabo", Quantity::new(4), pricing()));

        let groups = group_items(&cart);
        assert_eq!(groups.len(), 1);
        assert!(matches!(groups.first().unwrap(), CartGroup::Single { .. }));
    }

    #[test]
    fn test_lone_model_row_is_grouped() {
        let mut cart = Cart::new();
        cart.add_item(
            NewLineItem::new("P1", "Capinha", Quantity::new(3), pricing())
                .with_model("m1", "iPhone 15"),
        );
        let groups = group_items(&cart);
        assert!(matches!(groups.first().unwrap(), CartGroup::Variants { .. }));
    }

    #[test]
    fn test_groups_keep_cart_order() {
        let mut cart = Cart::new();
        cart.add_item(NewLineItem::new("P2", "Cabo", Quantity::new(4), pricing()));
        cart.add_item(
            NewLineItem::new("P1", "Capinha", Quantity::new(3), pricing())
                .with_model("m1", "iPhone 15"),
        );
        cart.add_item(NewLineItem::new("P3", "Fonte", Quantity::new(1), pricing()));

        let ids: Vec<String> = group_items(&cart)
            .iter()
            .map(|g| g.product_id().to_string())
            .collect();
        assert_eq!(ids, vec!["P2", "P1", "P3"]);
    }
}
