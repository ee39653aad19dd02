//! Backend API client.
//!
//! Covers the calls the storefront makes to its backend: cart snapshot
//! sync, marking a cart as contacted, the webhook settings lookup and order
//! submission. Side-channel calls go through the shared retry policy; order
//! submission is attempted exactly once.

use std::sync::Arc;
use std::time::Duration;

use atacado_core::{
    AnalyticsSnapshot, LineItem, OrderId, OrderRequest, SessionId, WebhookSettings, WhatsAppNumber,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use super::retry::{RetryPolicy, Transient, execute_with_retry};

/// Errors that can occur when calling the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

impl Transient for BackendError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Url(_) => false,
        }
    }
}

/// Body of `POST /cart-sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSync {
    /// Visitor session.
    pub session_id: SessionId,
    /// Collected contact.
    pub whatsapp: Option<WhatsAppNumber>,
    /// Cart rows.
    pub cart_data: Vec<LineItem>,
    /// Analytics projection.
    pub analytics_data: AnalyticsSnapshot,
    /// Last cart mutation (epoch millis).
    pub last_activity: i64,
}

/// Body of `POST /cart-mark-contacted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkContacted {
    /// Visitor session.
    pub session_id: SessionId,
    /// Whether the cart was handled.
    pub contacted: bool,
}

/// What the backend returned for an accepted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    /// Backend order id, when the response carries one.
    #[serde(default, alias = "id")]
    pub order_id: Option<OrderId>,
}

/// Backend API client.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl BackendClient {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url, timeout: Duration, retry: RetryPolicy) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url,
                retry,
            }),
        })
    }

    /// Push a cart snapshot for the admin dashboards.
    ///
    /// # Errors
    ///
    /// Returns the last error once the retry budget is spent.
    #[instrument(skip(self, sync), fields(session_id = %sync.session_id))]
    pub async fn cart_sync(&self, sync: &CartSync) -> Result<(), BackendError> {
        self.post_with_retry("cart-sync", sync).await
    }

    /// Flag the session's cart as handled so it leaves abandonment views.
    ///
    /// # Errors
    ///
    /// Returns the last error once the retry budget is spent.
    #[instrument(skip(self))]
    pub async fn mark_contacted(&self, session_id: &SessionId, contacted: bool) -> Result<(), BackendError> {
        let body = MarkContacted {
            session_id: session_id.clone(),
            contacted,
        };
        self.post_with_retry("cart-mark-contacted", &body).await
    }

    /// Fetch per-event webhook settings.
    ///
    /// # Errors
    ///
    /// Returns the last error once the retry budget is spent, or a parse
    /// error for an unexpected body.
    #[instrument(skip(self))]
    pub async fn webhook_settings(&self) -> Result<WebhookSettings, BackendError> {
        let url = self.inner.base_url.join("webhook-settings")?;
        let (settings, _) = execute_with_retry(&self.inner.retry, "webhook_settings", || {
            let url = url.clone();
            async move {
                let response = self.inner.client.get(url).send().await?;
                let response = check_status(response).await?;
                Ok::<_, BackendError>(response.json::<WebhookSettings>().await?)
            }
        })
        .await
        .map_err(|e| {
            warn!(attempts = e.attempts(), "Webhook settings lookup failed");
            e.into_error()
        })?;
        Ok(settings)
    }

    /// Submit an order. Attempted once; a failure means the order did not
    /// go through.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects the order.
    #[instrument(skip(self, order), fields(items = order.items.len()))]
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BackendError> {
        let url = self.inner.base_url.join("orders")?;
        let response = self.inner.client.post(url).json(order).send().await?;
        let response = check_status(response).await?;

        // Receipt fields are optional; an empty or unexpected body still
        // means the order was accepted.
        let body = response.text().await.unwrap_or_default();
        let receipt = serde_json::from_str(&body).unwrap_or_default();
        debug!(?receipt, "Order accepted");
        Ok(receipt)
    }

    async fn post_with_retry<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), BackendError> {
        let url = self.inner.base_url.join(path)?;
        execute_with_retry(&self.inner.retry, path, || {
            let url = url.clone();
            async move {
                let response = self.inner.client.post(url).json(body).send().await?;
                check_status(response).await?;
                Ok::<_, BackendError>(())
            }
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(endpoint = path, attempts = e.attempts(), "Backend call failed");
            e.into_error()
        })
    }
}

/// Turn a non-success status into [`BackendError::Api`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(BackendError::Api {
        status: status.as_u16(),
        message: message.chars().take(200).collect(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_classified() {
        let server = BackendError::Api {
            status: 503,
            message: String::new(),
        };
        let client = BackendError::Api {
            status: 400,
            message: String::new(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn test_receipt_accepts_id_alias() {
        let receipt: OrderReceipt = serde_json::from_str(r#"{"id":"ord_1"}"#).unwrap();
        assert_eq!(receipt.order_id, Some(OrderId::new("ord_1")));
        let receipt: OrderReceipt = serde_json::from_str(r#"{"orderId":"ord_2","ok":true}"#).unwrap();
        assert_eq!(receipt.order_id, Some(OrderId::new("ord_2")));
    }

    #[test]
    fn test_mark_contacted_shape() {
        let body = MarkContacted {
            session_id: SessionId::new("session_1"),
            contacted: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sessionId"], "session_1");
        assert_eq!(json["contacted"], true);
    }
}
