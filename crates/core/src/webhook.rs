//! Automation webhook contract: event types, routing settings, the payload
//! envelope and the local delivery log.

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::analytics::{AnalyticsSession, AnalyticsSnapshot};
use crate::cart::{Cart, CartSummary, LineItem};
use crate::checkout::OrderRequest;
use crate::types::{DeploymentEnvironment, OrderId, SessionId, WebhookEnvironment, WhatsAppNumber};

/// Maximum entries kept in the delivery log.
pub const MAX_DELIVERY_LOG: usize = 50;

/// Outbound event names. The name is also the endpoint path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebhookEventType {
    /// A visitor left a contact number.
    WhatsappCollected,
    /// An order was accepted by the backend.
    OrderCompleted,
    /// A non-empty cart went quiet past the abandonment threshold.
    CartAbandoned,
    /// Periodic analytics snapshot for known contacts.
    AnalyticsHeartbeat,
}

impl WebhookEventType {
    /// Every event type.
    pub const ALL: [Self; 4] = [
        Self::WhatsappCollected,
        Self::OrderCompleted,
        Self::CartAbandoned,
        Self::AnalyticsHeartbeat,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsappCollected => "whatsappCollected",
            Self::OrderCompleted => "orderCompleted",
            Self::CartAbandoned => "cartAbandoned",
            Self::AnalyticsHeartbeat => "analyticsHeartbeat",
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether and where an event type is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRoute {
    /// Send at all.
    pub enabled: bool,
    /// Endpoint root to use.
    pub environment: WebhookEnvironment,
}

impl WebhookRoute {
    /// Route used when no remote setting applies.
    ///
    /// Local deployments stay quiet; production deployments deliver to the
    /// production endpoints.
    #[must_use]
    pub const fn default_for(deployment: DeploymentEnvironment) -> Self {
        match deployment {
            DeploymentEnvironment::Local => Self {
                enabled: false,
                environment: WebhookEnvironment::Test,
            },
            DeploymentEnvironment::Production => Self {
                enabled: true,
                environment: WebhookEnvironment::Production,
            },
        }
    }
}

/// One row of `GET /webhook-settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSetting {
    /// Event type the row configures.
    pub webhook_type: WebhookEventType,
    /// Send at all.
    pub enabled: bool,
    /// Endpoint root.
    pub environment: WebhookEnvironment,
}

/// Remote settings, one row per configured event type.
///
/// Rows this build does not understand (unknown event types, malformed
/// rows) are dropped on deserialization; the remaining rows still apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WebhookSettings(pub Vec<WebhookSetting>);

impl<'de> Deserialize<'de> for WebhookSettings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Row {
            Known(WebhookSetting),
            Unknown(IgnoredAny),
        }

        let rows = Vec::<Row>::deserialize(deserializer)?;
        Ok(Self(
            rows.into_iter()
                .filter_map(|row| match row {
                    Row::Known(setting) => Some(setting),
                    Row::Unknown(_) => None,
                })
                .collect(),
        ))
    }
}

impl WebhookSettings {
    /// Route for `event`, falling back to the deployment default when the
    /// event has no row.
    #[must_use]
    pub fn route_for(&self, event: WebhookEventType, deployment: DeploymentEnvironment) -> WebhookRoute {
        self.0
            .iter()
            .find(|s| s.webhook_type == event)
            .map_or_else(
                || WebhookRoute::default_for(deployment),
                |s| WebhookRoute {
                    enabled: s.enabled,
                    environment: s.environment,
                },
            )
    }
}

/// Who the event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookUser {
    /// Collected contact, if any.
    pub whatsapp: Option<WhatsAppNumber>,
    /// Visitor session.
    pub session_id: SessionId,
}

/// Body of every outbound webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEnvelope<D> {
    /// Event name.
    pub event: WebhookEventType,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Subject.
    pub user: WebhookUser,
    /// Bounded analytics projection.
    pub analytics: AnalyticsSnapshot,
    /// Event-specific payload.
    pub data: D,
}

impl<D> WebhookEnvelope<D> {
    /// Wrap `data` with the session's identity and analytics snapshot.
    #[must_use]
    pub fn new(event: WebhookEventType, session: &AnalyticsSession, data: D, now: DateTime<Utc>) -> Self {
        Self {
            event,
            timestamp: now,
            user: WebhookUser {
                whatsapp: session.whatsapp_collected.clone(),
                session_id: session.session_id.clone(),
            },
            analytics: session.snapshot(),
            data,
        }
    }
}

/// `data` of `cartAbandoned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartAbandonedData {
    /// Rows left in the cart.
    pub items: Vec<LineItem>,
    /// Subtotal, units and savings.
    pub summary: CartSummary,
    /// Last cart mutation the detector saw.
    pub last_cart_activity: i64,
}

impl CartAbandonedData {
    /// Capture the cart as it was abandoned.
    #[must_use]
    pub fn new(cart: &Cart, last_cart_activity: i64) -> Self {
        Self {
            items: cart.items().to_vec(),
            summary: cart.summary(),
            last_cart_activity,
        }
    }
}

/// `data` of `orderCompleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompletedData {
    /// Backend order id, when returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    /// Submitted order.
    pub order: OrderRequest,
    /// Totals at submission.
    pub summary: CartSummary,
}

/// `data` of `whatsappCollected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappCollectedData {
    /// Number just collected.
    pub whatsapp: WhatsAppNumber,
    /// Number it replaced, when edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<WhatsAppNumber>,
}

/// How a single dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DeliveryOutcome {
    /// Endpoint answered with a success status.
    Delivered {
        /// HTTP status.
        status: u16,
        /// Attempts used.
        attempts: u32,
    },
    /// Every attempt failed, or a non-retryable error occurred.
    Failed {
        /// Attempts used.
        attempts: u32,
        /// Last error seen.
        error: String,
    },
    /// Event disabled by settings; nothing was sent.
    Skipped,
}

impl DeliveryOutcome {
    /// Whether the endpoint accepted the event.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// One delivery log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// When dispatch finished.
    pub timestamp: DateTime<Utc>,
    /// Event name.
    pub event: WebhookEventType,
    /// Targeted endpoint root.
    pub environment: WebhookEnvironment,
    /// Full endpoint URL; absent when skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

/// Capped delivery log, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryLog(Vec<DeliveryRecord>);

impl DeliveryLog {
    /// Append, dropping the oldest entries beyond [`MAX_DELIVERY_LOG`].
    pub fn push(&mut self, record: DeliveryRecord) {
        self.0.push(record);
        let overflow = self.0.len().saturating_sub(MAX_DELIVERY_LOG);
        self.0.drain(..overflow);
    }

    /// Entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[DeliveryRecord] {
        &self.0
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
