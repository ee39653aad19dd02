//! Cart route handlers.
//!
//! Every mutation answers with the full [`CartView`] so the UI can redraw
//! rows, groups, totals and the minimum-order banner from one response.

use atacado_core::{LineItemId, ModelId, NewLineItem, Price, PriceTier, ProductId, Quantity, TierSchedule};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::context::CartView;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Add to cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub model_id: Option<ModelId>,
    pub name: String,
    #[serde(default)]
    pub subname: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub unit_price: Price,
    #[serde(default)]
    pub special_price: Option<Price>,
    #[serde(default)]
    pub special_quantity: Option<u32>,
    #[serde(default)]
    pub super_wholesale_price: Option<Price>,
    #[serde(default)]
    pub super_wholesale_quantity: Option<u32>,
}

const fn default_quantity() -> i64 {
    1
}

/// A tier is only usable with both a price and a positive threshold.
fn tier(price: Option<Price>, quantity: Option<u32>) -> Option<PriceTier> {
    match (price, quantity) {
        (Some(price), Some(quantity)) if quantity > 0 => {
            Some(PriceTier::new(price, Quantity::new(quantity)))
        }
        _ => None,
    }
}

impl From<AddItemRequest> for NewLineItem {
    fn from(req: AddItemRequest) -> Self {
        let pricing = TierSchedule {
            unit_price: req.unit_price,
            special: tier(req.special_price, req.special_quantity),
            super_wholesale: tier(req.super_wholesale_price, req.super_wholesale_quantity),
        };
        Self {
            product_id: req.product_id,
            model_id: req.model_id,
            name: req.name,
            subname: req.subname,
            model_name: req.model_name,
            image: req.image,
            quantity: Quantity::clamped(req.quantity),
            pricing,
        }
    }
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Show the cart.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>) -> Json<CartView> {
    Json(state.storefront().cart().await)
}

/// Add an item to the cart.
#[instrument(skip(state, req), fields(product_id = %req.product_id, quantity = req.quantity))]
pub async fn add(
    State(state): State<AppState>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    if req.quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be positive".to_string()));
    }

    add_breadcrumb("cart", "Add to cart", Some(&[("product_id", req.product_id.as_str())]));
    Ok(Json(state.storefront().add_item(req.into()).await))
}

/// Update a row's quantity.
#[instrument(skip(state))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>> {
    let id = LineItemId::new(id);
    state
        .storefront()
        .update_quantity(&id, req.quantity)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("cart item {id}")))
}

/// Remove a row.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CartView>> {
    let id = LineItemId::new(id);
    add_breadcrumb("cart", "Remove from cart", Some(&[("line_id", id.as_str())]));
    state
        .storefront()
        .remove_item(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("cart item {id}")))
}

/// Empty the cart.
#[instrument(skip(state))]
pub async fn clear(State(state): State<AppState>) -> Json<CartView> {
    Json(state.storefront().clear_cart().await)
}
