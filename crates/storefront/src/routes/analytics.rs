//! Analytics and identity route handlers.

use atacado_core::{AbandonmentState, AnalyticsSession, ContactUpdate, ProductId, WhatsAppNumber};
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CategoryVisitRequest {
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub term: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductViewRequest {
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct WhatsAppRequest {
    pub whatsapp: String,
}

/// How a submitted number changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Collected,
    Unchanged,
    Changed,
}

impl From<&ContactUpdate> for ContactStatus {
    fn from(update: &ContactUpdate) -> Self {
        match update {
            ContactUpdate::Collected => Self::Collected,
            ContactUpdate::Unchanged => Self::Unchanged,
            ContactUpdate::Changed { .. } => Self::Changed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WhatsAppResponse {
    pub whatsapp: WhatsAppNumber,
    pub status: ContactStatus,
}

/// Session plus the detector state derived from it.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: AnalyticsSession,
    pub abandonment: AbandonmentState,
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

/// Record a category visit.
#[instrument(skip(state))]
pub async fn category_visit(
    State(state): State<AppState>,
    Json(req): Json<CategoryVisitRequest>,
) -> Result<StatusCode> {
    required(&req.category, "category")?;
    state.storefront().track_category_visit(&req.category).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a search.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<StatusCode> {
    required(&req.term, "term")?;
    state.storefront().track_search(&req.term).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a product page view.
#[instrument(skip(state))]
pub async fn product_view(
    State(state): State<AppState>,
    Json(req): Json<ProductViewRequest>,
) -> Result<StatusCode> {
    required(req.product_id.as_str(), "productId")?;
    state
        .storefront()
        .track_product_view(&req.product_id, &req.product_name, &req.category)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Current analytics session.
#[instrument(skip(state))]
pub async fn session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.storefront().session().await;
    let abandonment = AbandonmentState::of(session.last_cart_activity);
    Json(SessionResponse {
        session,
        abandonment,
    })
}

/// Collect the visitor's WhatsApp number.
#[instrument(skip_all)]
pub async fn whatsapp(
    State(state): State<AppState>,
    Json(req): Json<WhatsAppRequest>,
) -> Result<Json<WhatsAppResponse>> {
    let number = WhatsAppNumber::parse(&req.whatsapp)?;
    add_breadcrumb("identity", "WhatsApp submitted", None);

    let update = state
        .storefront()
        .track_whatsapp_collection(number.clone())
        .await;
    Ok(Json(WhatsAppResponse {
        whatsapp: number,
        status: ContactStatus::from(&update),
    }))
}
