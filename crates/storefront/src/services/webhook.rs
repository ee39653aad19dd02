//! Webhook dispatcher.
//!
//! Resolves whether and where an event goes (remote settings, cached, with a
//! per-deployment fallback), signs the body, delivers it with the shared
//! retry policy and appends the outcome to the persisted delivery log.
//! Dispatch never returns an error: every failure ends up as a
//! [`DeliveryOutcome::Failed`] entry.

use std::sync::Arc;

use atacado_core::{
    DeliveryLog, DeliveryOutcome, DeliveryRecord, DeploymentEnvironment, WebhookEnvelope,
    WebhookEventType, WebhookRoute, WebhookSettings,
};
use hmac::{Hmac, Mac};
use moka::future::Cache;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use url::Url;

use super::backend::BackendClient;
use super::retry::{RetryPolicy, Transient, execute_with_retry};
use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::storage::{self, DELIVERY_LOG_KEY, KeyValueStore};

/// Header carrying the HMAC of the body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the event name.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

const SETTINGS_KEY: &str = "webhook-settings";

/// Errors from a single delivery attempt.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Endpoint URL could not be built.
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// Envelope could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Signing key rejected by the MAC.
    #[error("invalid signing key")]
    InvalidSigningKey,
}

impl Transient for WebhookError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Url(_) | Self::Serialize(_) | Self::InvalidSigningKey => false,
        }
    }
}

/// Delivers webhook envelopes.
#[derive(Clone)]
pub struct WebhookDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    client: reqwest::Client,
    config: WebhookConfig,
    deployment: DeploymentEnvironment,
    backend: BackendClient,
    settings: Cache<&'static str, WebhookSettings>,
    retry: RetryPolicy,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    log: Mutex<DeliveryLog>,
}

impl WebhookDispatcher {
    /// Create a dispatcher. The persisted delivery log is loaded from
    /// `store`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub async fn new(
        config: WebhookConfig,
        deployment: DeploymentEnvironment,
        backend: BackendClient,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let settings = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.settings_ttl)
            .build();
        let retry = RetryPolicy::new(config.max_attempts, config.retry_delay);
        let log = storage::load_or_default(store.as_ref(), DELIVERY_LOG_KEY).await;

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                client,
                config,
                deployment,
                backend,
                settings,
                retry,
                store,
                clock,
                log: Mutex::new(log),
            }),
        })
    }

    /// Route for `event` under the current settings.
    pub async fn route_for(&self, event: WebhookEventType) -> WebhookRoute {
        match self.settings().await {
            Some(settings) => settings.route_for(event, self.inner.deployment),
            None => WebhookRoute::default_for(self.inner.deployment),
        }
    }

    /// Routes for every event type.
    pub async fn routes(&self) -> Vec<(WebhookEventType, WebhookRoute)> {
        let settings = self.settings().await;
        WebhookEventType::ALL
            .into_iter()
            .map(|event| {
                let route = settings.as_ref().map_or_else(
                    || WebhookRoute::default_for(self.inner.deployment),
                    |s| s.route_for(event, self.inner.deployment),
                );
                (event, route)
            })
            .collect()
    }

    /// Delivery log, oldest first.
    pub async fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.inner.log.lock().await.entries().to_vec()
    }

    /// Deliver `envelope` and record the outcome.
    #[instrument(skip_all, fields(event = %envelope.event, session_id = %envelope.user.session_id))]
    pub async fn send<D: Serialize + Sync>(&self, envelope: &WebhookEnvelope<D>) -> DeliveryOutcome {
        let event = envelope.event;
        let route = self.route_for(event).await;

        if !route.enabled {
            info!(environment = %route.environment, "Webhook disabled, skipping");
            self.record(event, route, None, DeliveryOutcome::Skipped).await;
            return DeliveryOutcome::Skipped;
        }

        let endpoint = match self.inner.config.base_url(route.environment).join(event.as_str()) {
            Ok(url) => url,
            Err(e) => {
                let outcome = failed(0, &WebhookError::from(e));
                self.record(event, route, None, outcome.clone()).await;
                return outcome;
            }
        };

        let outcome = match self.deliver(event, &endpoint, envelope).await {
            Ok((status, attempts)) => {
                info!(
                    environment = %route.environment,
                    endpoint = %endpoint,
                    status,
                    attempts,
                    "Webhook delivered"
                );
                DeliveryOutcome::Delivered { status, attempts }
            }
            Err((attempts, error)) => {
                warn!(
                    environment = %route.environment,
                    endpoint = %endpoint,
                    attempts,
                    error = %error,
                    "Webhook delivery failed"
                );
                failed(attempts, &error)
            }
        };

        self.record(event, route, Some(endpoint.to_string()), outcome.clone())
            .await;
        outcome
    }

    async fn deliver<D: Serialize + Sync>(
        &self,
        event: WebhookEventType,
        endpoint: &Url,
        envelope: &WebhookEnvelope<D>,
    ) -> Result<(u16, u32), (u32, WebhookError)> {
        let body = serde_json::to_vec(envelope).map_err(|e| (0, e.into()))?;
        let signature = match &self.inner.config.signing_secret {
            Some(secret) => Some(sign(secret, &body).map_err(|e| (0, e))?),
            None => None,
        };

        execute_with_retry(&self.inner.retry, event.as_str(), || {
            let mut request = self
                .inner
                .client
                .post(endpoint.clone())
                .header(CONTENT_TYPE, "application/json")
                .header(EVENT_HEADER, event.as_str())
                .body(body.clone());
            if let Some(signature) = &signature {
                request = request.header(SIGNATURE_HEADER, signature.as_str());
            }
            attempt(request)
        })
        .await
        .map_err(|e| (e.attempts(), e.into_error()))
    }

    async fn settings(&self) -> Option<WebhookSettings> {
        if let Some(settings) = self.inner.settings.get(SETTINGS_KEY).await {
            return Some(settings);
        }
        match self.inner.backend.webhook_settings().await {
            Ok(settings) => {
                self.inner
                    .settings
                    .insert(SETTINGS_KEY, settings.clone())
                    .await;
                Some(settings)
            }
            Err(e) => {
                warn!(
                    deployment = %self.inner.deployment,
                    error = %e,
                    "Using default webhook settings"
                );
                None
            }
        }
    }

    async fn record(
        &self,
        event: WebhookEventType,
        route: WebhookRoute,
        endpoint: Option<String>,
        outcome: DeliveryOutcome,
    ) {
        let mut log = self.inner.log.lock().await;
        log.push(DeliveryRecord {
            timestamp: self.inner.clock.now(),
            event,
            environment: route.environment,
            endpoint,
            outcome,
        });
        storage::persist(self.inner.store.as_ref(), DELIVERY_LOG_KEY, &*log).await;
    }
}

/// One POST; success statuses yield the status code.
async fn attempt(request: reqwest::RequestBuilder) -> Result<u16, WebhookError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(status.as_u16());
    }
    let body = response.text().await.unwrap_or_default();
    Err(WebhookError::Status {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

fn failed(attempts: u32, error: &WebhookError) -> DeliveryOutcome {
    DeliveryOutcome::Failed {
        attempts,
        error: error.to_string(),
    }
}

/// `sha256=<hex HMAC-SHA256 of body>`.
///
/// # Errors
///
/// Returns [`WebhookError::InvalidSigningKey`] if the key is rejected.
pub fn sign(secret: &SecretString, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| WebhookError::InvalidSigningKey)?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
