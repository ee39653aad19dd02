//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                    - Health check
//!
//! # Cart
//! GET    /api/cart                  - Rows, groups, totals, upgrade hints, gate
//! POST   /api/cart/items            - Add units of a product (model)
//! PATCH  /api/cart/items/{id}       - Set a row's quantity (clamped, 0 removes)
//! DELETE /api/cart/items/{id}       - Remove a row
//! DELETE /api/cart                  - Empty the cart
//!
//! # Analytics
//! POST   /api/analytics/categories  - Record a category visit
//! POST   /api/analytics/searches    - Record a search
//! POST   /api/analytics/products    - Record a product view
//! GET    /api/analytics/session     - Current analytics session
//!
//! # Identity
//! POST   /api/identity/whatsapp     - Collect the visitor's WhatsApp number
//!
//! # Checkout
//! POST   /api/checkout              - Minimum-order gate + order submission
//!
//! # Webhooks
//! GET    /api/webhooks/deliveries   - Local delivery log
//! ```

pub mod analytics;
pub mod cart;
pub mod checkout;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route("/items/{id}", patch(cart::update).delete(cart::remove))
}

/// Create the analytics routes router.
pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", post(analytics::category_visit))
        .route("/searches", post(analytics::search))
        .route("/products", post(analytics::product_view))
        .route("/session", get(analytics::session))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/cart", cart_routes())
        .nest("/api/analytics", analytics_routes())
        .route("/api/identity/whatsapp", post(analytics::whatsapp))
        .route("/api/checkout", post(checkout::submit))
        .route("/api/webhooks/deliveries", get(webhooks::deliveries))
}
