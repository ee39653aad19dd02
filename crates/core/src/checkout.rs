//! Minimum-order gate and order submission payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::Cart;
use crate::types::{ModelId, ProductId, Quantity, WhatsAppNumber};

/// Reasons checkout is refused before anything is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// The cart has no rows.
    #[error("cart is empty")]
    EmptyCart,
    /// Total units are below the wholesale minimum.
    #[error("minimum order is {minimum} units, {remaining} more needed")]
    BelowMinimum {
        /// Configured minimum.
        minimum: Quantity,
        /// Units still missing.
        remaining: Quantity,
    },
}

/// Where the cart stands against the minimum order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStatus {
    /// Configured minimum.
    pub minimum: Quantity,
    /// Units currently in the cart.
    pub items_count: Quantity,
    /// Units still missing, zero when the minimum is met.
    pub remaining: Quantity,
    /// Whether checkout may proceed.
    pub allowed: bool,
}

/// Wholesale minimum-order rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumOrder {
    minimum: Quantity,
}

impl MinimumOrder {
    /// Reference minimum of the wholesale catalog.
    pub const DEFAULT_UNITS: u32 = 30;

    /// Create a rule requiring `minimum` units.
    #[must_use]
    pub const fn new(minimum: Quantity) -> Self {
        Self { minimum }
    }

    /// The configured minimum.
    #[must_use]
    pub const fn minimum(&self) -> Quantity {
        self.minimum
    }

    /// Status of `cart` against the rule. Safe on an empty cart.
    #[must_use]
    pub fn status(&self, cart: &Cart) -> CheckoutStatus {
        let items_count = cart.items_count();
        let remaining = items_count.remaining_to(self.minimum);
        CheckoutStatus {
            minimum: self.minimum,
            items_count,
            remaining,
            allowed: !cart.is_empty() && remaining.is_zero(),
        }
    }

    /// Refuse checkout unless `cart` satisfies the rule.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] for an empty cart and
    /// [`CheckoutError::BelowMinimum`] when units are missing.
    pub fn check(&self, cart: &Cart) -> Result<CheckoutStatus, CheckoutError> {
        let status = self.status(cart);
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if !status.allowed {
            return Err(CheckoutError::BelowMinimum {
                minimum: status.minimum,
                remaining: status.remaining,
            });
        }
        Ok(status)
    }
}

impl Default for MinimumOrder {
    fn default() -> Self {
        Self::new(Quantity::new(Self::DEFAULT_UNITS))
    }
}

/// Buyer details sent with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Buyer or store name.
    pub name: String,
    /// Contact number.
    pub whatsapp: WhatsAppNumber,
    /// Optional e-mail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional company tax ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Optional city.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// One ordered row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Product.
    pub product_id: ProductId,
    /// Units.
    pub quantity: Quantity,
    /// Phone model, when the product is sold per model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<ModelId>,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Buyer.
    pub customer: Customer,
    /// Ordered rows.
    pub items: Vec<OrderItem>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
}

impl OrderRequest {
    /// Build an order for every row in `cart`.
    #[must_use]
    pub fn from_cart(customer: Customer, cart: &Cart, notes: impl Into<String>) -> Self {
        Self {
            customer,
            items: cart
                .items()
                .iter()
                .map(|row| OrderItem {
                    product_id: row.product_id.clone(),
                    quantity: row.quantity,
                    model_id: row.model_id.clone(),
                })
                .collect(),
            notes: notes.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::NewLineItem;
    use crate::pricing::TierSchedule;
    use crate::types::Price;

    fn cart_with(units: u32) -> Cart {
        let mut cart = Cart::new();
        cart.add_item(NewLineItem::new(
            "P1",
            "Capinha",
            Quantity::new(units),
            TierSchedule::retail(Price::from_cents(1000)),
        ));
        cart
    }

    #[test]
    fn test_below_minimum_is_blocked() {
        let gate = MinimumOrder::default();
        let cart = cart_with(29);
        let status = gate.status(&cart);
        assert!(!status.allowed);
        assert_eq!(status.remaining, Quantity::new(1));
        assert_eq!(
            gate.check(&cart),
            Err(CheckoutError::BelowMinimum {
                minimum: Quantity::new(30),
                remaining: Quantity::new(1),
            })
        );
    }

    #[test]
    fn test_at_minimum_proceeds() {
        let gate = MinimumOrder::default();
        let status = gate.check(&cart_with(30)).unwrap();
        assert!(status.allowed);
        assert_eq!(status.remaining, Quantity::ZERO);
    }

    #[test]
    fn test_empty_cart_status_does_not_panic() {
        let gate = MinimumOrder::default();
        let status = gate.status(&Cart::new());
        assert_eq!(status.remaining, Quantity::new(30));
        assert!(!status.allowed);
        assert_eq!(gate.check(&Cart::new()), Err(CheckoutError::EmptyCart));
    }

    #[test]
    fn test_order_request_from_cart() {
        let mut cart = cart_with(10);
        cart.add_item(
            NewLineItem::new(
                "P2",
                "Capinha",
                Quantity::new(20),
                TierSchedule::retail(Price::from_cents(900)),
            )
            .with_model("m7", "iPhone 15"),
        );
        let customer = Customer {
            name: "Loja Central".to_owned(),
            whatsapp: WhatsAppNumber::parse("11987654321").unwrap(),
            email: None,
            document: None,
            city: Some("Campinas".to_owned()),
        };

        let order = OrderRequest::from_cart(customer, &cart, "entregar de manhã");
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["customer"]["whatsapp"], "11987654321");
        assert_eq!(json["items"][0]["productId"], "P1");
        assert!(json["items"][0].get("modelId").is_none());
        assert_eq!(json["items"][1]["modelId"], "m7");
        assert_eq!(json["items"][1]["quantity"], 20);
        assert_eq!(json["notes"], "entregar de manhã");
    }
}
