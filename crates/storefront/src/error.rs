//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Side-channel failures (webhooks, cart sync) never reach this type.

use atacado_core::{CheckoutError, PhoneError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::context::OrderError;

/// Application-level error type for the storefront API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order refused or rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Contact number failed validation.
    #[error("Invalid WhatsApp number: {0}")]
    InvalidPhone(#[from] PhoneError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Order(OrderError::Checkout(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Order(OrderError::Rejected(_)) => StatusCode::BAD_GATEWAY,
            Self::InvalidPhone(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Order(OrderError::Rejected(_))) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let body = match &self {
            Self::Order(OrderError::Checkout(CheckoutError::BelowMinimum { minimum, remaining })) => {
                json!({
                    "error": format!("Pedido mínimo de {minimum} unidades. Faltam {remaining}."),
                    "minimum": minimum,
                    "remaining": remaining,
                })
            }
            Self::Order(OrderError::Checkout(CheckoutError::EmptyCart)) => {
                json!({ "error": "Carrinho vazio" })
            }
            Self::Order(OrderError::Rejected(_)) => {
                json!({ "error": "Não foi possível enviar o pedido. Tente novamente." })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use atacado_core::Quantity;

    use super::*;
    use crate::services::BackendError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("line-123".to_string());
        assert_eq!(err.to_string(), "Not found: line-123");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::InvalidPhone(PhoneError::Empty)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_order_error_status_codes() {
        let below = OrderError::Checkout(CheckoutError::BelowMinimum {
            minimum: Quantity::new(30),
            remaining: Quantity::new(1),
        });
        assert_eq!(
            get_status(AppError::Order(below)),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let rejected = OrderError::Rejected(BackendError::Api {
            status: 500,
            message: "boom".to_string(),
        });
        assert_eq!(get_status(AppError::Order(rejected)), StatusCode::BAD_GATEWAY);
    }
}
