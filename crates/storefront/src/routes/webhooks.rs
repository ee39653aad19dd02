//! Webhook delivery log.

use atacado_core::DeliveryRecord;
use axum::{Json, extract::State};
use tracing::instrument;

use crate::state::AppState;

/// Recent webhook deliveries, oldest first.
#[instrument(skip(state))]
pub async fn deliveries(State(state): State<AppState>) -> Json<Vec<DeliveryRecord>> {
    Json(state.storefront().deliveries().await)
}
