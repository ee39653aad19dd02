//! Checkout route handler.

use atacado_core::{Customer, WhatsAppNumber};
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use crate::context::OrderConfirmation;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Buyer details as submitted by the checkout form.
///
/// `whatsapp` may be left out when the visitor's contact was already
/// collected; the collected number is used instead.
#[derive(Debug, Deserialize)]
pub struct CustomerForm {
    pub name: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl CustomerForm {
    fn into_customer(self, collected: Option<WhatsAppNumber>) -> Result<Customer> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("customer name is required".to_string()));
        }
        let whatsapp = match blank_to_none(self.whatsapp) {
            Some(number) => WhatsAppNumber::parse(&number)?,
            None => collected
                .ok_or_else(|| AppError::BadRequest("whatsapp is required".to_string()))?,
        };
        Ok(Customer {
            name: name.to_string(),
            whatsapp,
            email: blank_to_none(self.email),
            document: blank_to_none(self.document),
            city: blank_to_none(self.city),
        })
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub customer: CustomerForm,
    #[serde(default)]
    pub notes: String,
}

/// Submit the cart as an order.
#[instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderConfirmation>)> {
    let collected = state.storefront().session().await.default_contact().cloned();
    let customer = req.customer.into_customer(collected)?;
    add_breadcrumb("checkout", "Order submitted", None);

    let confirmation = state.storefront().submit_order(customer, req.notes).await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form(whatsapp: Option<&str>) -> CustomerForm {
        CustomerForm {
            name: " Loja Centro ".to_string(),
            whatsapp: whatsapp.map(str::to_string),
            email: Some("  ".to_string()),
            document: None,
            city: Some("Recife".to_string()),
        }
    }

    #[test]
    fn test_customer_form_normalizes() {
        let customer = form(Some("(81) 99876-5432")).into_customer(None).unwrap();
        assert_eq!(customer.name, "Loja Centro");
        assert_eq!(customer.whatsapp.as_str(), "81998765432");
        assert_eq!(customer.email, None);
        assert_eq!(customer.city.as_deref(), Some("Recife"));
    }

    #[test]
    fn test_customer_form_rejects_bad_number() {
        assert!(matches!(
            form(Some("123")).into_customer(None),
            Err(AppError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_customer_form_falls_back_to_collected_contact() {
        let collected = WhatsAppNumber::parse("(11) 91234-5678").unwrap();

        let customer = form(None).into_customer(Some(collected.clone())).unwrap();
        assert_eq!(customer.whatsapp, collected);
        let customer = form(Some(" ")).into_customer(Some(collected.clone())).unwrap();
        assert_eq!(customer.whatsapp, collected);

        // A typed number wins over the collected one.
        let customer = form(Some("(81) 99876-5432"))
            .into_customer(Some(collected))
            .unwrap();
        assert_eq!(customer.whatsapp.as_str(), "81998765432");

        assert!(matches!(
            form(None).into_customer(None),
            Err(AppError::BadRequest(_))
        ));
    }
}
