//! Order submission.

use atacado_core::webhook::OrderCompletedData;
use atacado_core::{CartSummary, CheckoutError, Customer, OrderId, OrderRequest, WebhookEnvelope, WebhookEventType};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::Storefront;
use crate::services::BackendError;

/// Why an order did not go through. The cart is untouched in every case.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Refused locally before anything was sent.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Backend did not accept the order.
    #[error("order was not accepted: {0}")]
    Rejected(#[source] BackendError),
}

/// An accepted order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    /// Backend order id, when returned.
    pub order_id: Option<OrderId>,
    /// Totals at submission.
    pub summary: CartSummary,
    /// Rows ordered.
    pub rows: usize,
}

impl Storefront {
    /// Submit the cart as an order.
    ///
    /// The minimum-order gate is checked first. On success the
    /// `orderCompleted` webhook is sent, the backend cart record is marked
    /// as contacted and the ordered units are taken out of the cart. Rows
    /// added while the order was in flight stay and keep being watched for
    /// abandonment; an emptied cart is disarmed. On failure the cart is
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Checkout`] when the gate refuses the cart and
    /// [`OrderError::Rejected`] when the backend does not accept the order.
    #[instrument(skip_all, fields(customer = %customer.name))]
    pub async fn submit_order(
        &self,
        customer: Customer,
        notes: String,
    ) -> Result<OrderConfirmation, OrderError> {
        let (order, summary) = {
            let state = self.lock().await;
            self.inner.minimum.check(&state.cart)?;
            (
                OrderRequest::from_cart(customer, &state.cart, notes),
                state.cart.summary(),
            )
        };

        let receipt = match self.inner.backend.submit_order(&order).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Order rejected, cart kept");
                return Err(OrderError::Rejected(e));
            }
        };

        let now = self.now();
        let (envelope, session_id, emptied) = {
            let mut state = self.lock().await;
            state
                .session
                .collect_whatsapp(order.customer.whatsapp.clone(), now);
            let envelope = WebhookEnvelope::new(
                WebhookEventType::OrderCompleted,
                &state.session,
                OrderCompletedData {
                    order_id: receipt.order_id.clone(),
                    order: order.clone(),
                    summary,
                },
                now,
            );
            for item in &order.items {
                state
                    .cart
                    .deduct(&item.product_id, item.model_id.as_ref(), item.quantity);
            }
            let emptied = state.cart.is_empty();
            if emptied {
                state.session.disarm_abandonment();
            }
            self.persist_cart(&state).await;
            self.persist_session(&state).await;
            (envelope, state.session.session_id.clone(), emptied)
        };

        if emptied {
            self.inner.timer.cancel();
        }
        self.spawn_mark_contacted(session_id.clone());
        self.spawn_webhook(envelope);

        info!(
            session_id = %session_id,
            order_id = ?receipt.order_id,
            units = %summary.items_count,
            subtotal = %summary.subtotal,
            "Order submitted"
        );

        Ok(OrderConfirmation {
            order_id: receipt.order_id,
            summary,
            rows: order.items.len(),
        })
    }
}
