//! Storefront runtime context.
//!
//! [`Storefront`] owns the visitor's cart and analytics session, persists
//! every mutation, drives the abandonment timer and sweep, and hands side
//! effects (cart sync, webhooks) to background tasks so callers never wait
//! on them. Create it with [`Storefront::init`] and stop its tasks with
//! [`Storefront::dispose`].

mod abandonment;
mod checkout;

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use atacado_core::webhook::WhatsappCollectedData;
use atacado_core::{
    AbandonmentPolicy, AnalyticsSession, Cart, CartChange, CartGroup, CartSummary,
    CheckoutStatus, ContactUpdate, DeliveryOutcome, DeliveryRecord, LineItem, LineItemId,
    MinimumOrder, NewLineItem, ProductId, Quantity, SessionId, UpgradeHint, WebhookEnvelope,
    WebhookEventType, WebhookRoute, WhatsAppNumber, group_items,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::StorefrontConfig;
use crate::services::{BackendClient, BackendError, CartSync, RetryPolicy, WebhookDispatcher, WebhookError};
use crate::storage::{self, ANALYTICS_KEY, CART_KEY, KeyValueStore};

pub use abandonment::AbandonmentCheck;
use abandonment::{AbandonmentTimer, CatchUp};
pub use checkout::{OrderConfirmation, OrderError};

/// Errors building a [`Storefront`].
#[derive(Debug, Error)]
pub enum InitError {
    /// Backend client could not be built.
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),

    /// Webhook dispatcher could not be built.
    #[error("webhook dispatcher: {0}")]
    Webhook(#[from] WebhookError),
}

/// Everything the UI needs to render the cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    /// Rows in cart order.
    pub items: Vec<LineItem>,
    /// Rows grouped by product.
    pub groups: Vec<CartGroup>,
    /// Subtotal, units and savings.
    pub summary: CartSummary,
    /// "Buy more, save more" hints.
    pub upgrades: Vec<UpgradeHint>,
    /// Minimum-order gate.
    pub checkout: CheckoutStatus,
}

impl CartView {
    fn of(cart: &Cart, minimum: &MinimumOrder) -> Self {
        Self {
            items: cart.items().to_vec(),
            groups: group_items(cart),
            summary: cart.summary(),
            upgrades: cart.eligible_upgrades(),
            checkout: minimum.status(cart),
        }
    }
}

/// The visitor-facing runtime.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<LocalState>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    backend: BackendClient,
    webhooks: WebhookDispatcher,
    policy: AbandonmentPolicy,
    minimum: MinimumOrder,
    timer: AbandonmentTimer,
    catch_up: std::sync::Mutex<Option<CatchUp>>,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

struct LocalState {
    cart: Cart,
    session: AnalyticsSession,
}

impl Storefront {
    /// Restore persisted state and start the runtime.
    ///
    /// Loads the cart and analytics session from `store` (corrupt documents
    /// load as empty, stale sessions are replaced), starts the fallback
    /// sweep and the optional heartbeat, and immediately evaluates
    /// abandonment so a threshold that elapsed while nothing was running
    /// still fires. A catch-up delivery runs in the background; await it
    /// with [`Storefront::catch_up`].
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP clients fail to build.
    pub async fn init(
        config: &StorefrontConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, InitError> {
        let retry = RetryPolicy::new(config.webhooks.max_attempts, config.webhooks.retry_delay);
        let backend = BackendClient::new(config.backend_url.clone(), config.webhooks.timeout, retry)?;
        let webhooks = WebhookDispatcher::new(
            config.webhooks.clone(),
            config.environment,
            backend.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
        )
        .await?;

        let now = clock.now();
        let cart: Cart = storage::load_or_default(store.as_ref(), CART_KEY).await;
        let stored = storage::load(store.as_ref(), ANALYTICS_KEY).await;
        let (session, fresh) = AnalyticsSession::resume(stored, now);
        if fresh {
            info!(session_id = %session.session_id, "Started analytics session");
            storage::persist(store.as_ref(), ANALYTICS_KEY, &session).await;
        } else {
            debug!(
                session_id = %session.session_id,
                rows = cart.items().len(),
                "Restored analytics session"
            );
        }

        let storefront = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LocalState { cart, session }),
                store,
                clock,
                backend,
                webhooks,
                policy: AbandonmentPolicy::new(config.abandonment.threshold),
                minimum: MinimumOrder::new(Quantity::new(config.min_order_units)),
                timer: AbandonmentTimer::default(),
                catch_up: std::sync::Mutex::new(None),
                background: std::sync::Mutex::new(Vec::new()),
            }),
        };

        storefront.spawn_sweep(config.abandonment.sweep_interval);
        if let Some(every) = config.heartbeat_interval {
            storefront.spawn_heartbeat(every);
        }
        storefront.start_catch_up().await;

        Ok(storefront)
    }

    /// Stop the timer, the sweep and the heartbeat. Deliveries already in
    /// flight are left to finish.
    pub fn dispose(&self) {
        self.inner.timer.cancel();
        let tasks = std::mem::take(
            &mut *self
                .inner
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
        }
        info!("Storefront disposed");
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    /// Current cart.
    pub async fn cart(&self) -> CartView {
        let state = self.lock().await;
        CartView::of(&state.cart, &self.inner.minimum)
    }

    /// Add units of a product (or product model), merging with an existing
    /// row for the same pair.
    pub async fn add_item(&self, item: NewLineItem) -> CartView {
        let mut state = self.lock().await;
        let change = state.cart.add_item(item);
        self.after_cart_change(state, change).await
    }

    /// Set a row's quantity; negative values clamp to zero and zero removes
    /// the row. Returns `None` for an unknown row.
    pub async fn update_quantity(&self, id: &LineItemId, quantity: i64) -> Option<CartView> {
        let mut state = self.lock().await;
        let change = state.cart.update_quantity(id, Quantity::clamped(quantity))?;
        Some(self.after_cart_change(state, Some(change)).await)
    }

    /// Delete a row. Returns `None` for an unknown row.
    pub async fn remove_item(&self, id: &LineItemId) -> Option<CartView> {
        let mut state = self.lock().await;
        let change = state.cart.remove_item(id)?;
        Some(self.after_cart_change(state, Some(change)).await)
    }

    /// Empty the cart and stop watching it for abandonment. Records no cart
    /// event.
    pub async fn clear_cart(&self) -> CartView {
        let mut state = self.lock().await;
        state.cart.clear();
        state.session.disarm_abandonment();
        self.persist_cart(&state).await;
        self.persist_session(&state).await;
        let view = CartView::of(&state.cart, &self.inner.minimum);
        drop(state);

        self.inner.timer.cancel();
        info!("Cart cleared");
        view
    }

    /// Minimum-order gate for the current cart.
    pub async fn checkout_status(&self) -> CheckoutStatus {
        let state = self.lock().await;
        self.inner.minimum.status(&state.cart)
    }

    async fn after_cart_change(
        &self,
        mut state: MutexGuard<'_, LocalState>,
        change: Option<CartChange>,
    ) -> CartView {
        let Some(change) = change else {
            return CartView::of(&state.cart, &self.inner.minimum);
        };

        let now = self.now();
        state.session.record_cart_event(&change, now);
        self.persist_cart(&state).await;
        self.persist_session(&state).await;
        debug!(
            session_id = %state.session.session_id,
            kind = %change.kind,
            product_id = %change.product_id,
            quantity = %change.quantity,
            "Cart changed"
        );

        let view = CartView::of(&state.cart, &self.inner.minimum);
        let sync = CartSync {
            session_id: state.session.session_id.clone(),
            whatsapp: state.session.whatsapp_collected.clone(),
            cart_data: view.items.clone(),
            analytics_data: state.session.snapshot(),
            last_activity: state.session.last_cart_activity,
        };
        drop(state);

        self.arm_abandonment_timer(self.inner.policy.threshold());
        self.spawn_cart_sync(sync);
        view
    }

    // -------------------------------------------------------------------------
    // Analytics and identity
    // -------------------------------------------------------------------------

    /// Current analytics session.
    pub async fn session(&self) -> AnalyticsSession {
        self.lock().await.session.clone()
    }

    /// Record a category page visit.
    pub async fn track_category_visit(&self, category: &str) {
        let now = self.now();
        let mut state = self.lock().await;
        state.session.record_category_visit(category, now);
        self.persist_session(&state).await;
    }

    /// Record a search.
    pub async fn track_search(&self, term: &str) {
        let now = self.now();
        let mut state = self.lock().await;
        state.session.record_search(term, now);
        self.persist_session(&state).await;
    }

    /// Record a product page view.
    pub async fn track_product_view(&self, product_id: &ProductId, name: &str, category: &str) {
        let now = self.now();
        let mut state = self.lock().await;
        state
            .session
            .record_product_view(product_id, name, category, now);
        self.persist_session(&state).await;
    }

    /// Store the visitor's contact and announce it with a
    /// `whatsappCollected` webhook. Re-submitting the same number sends
    /// nothing.
    pub async fn track_whatsapp_collection(&self, number: WhatsAppNumber) -> ContactUpdate {
        let now = self.now();
        let mut state = self.lock().await;
        let update = state.session.collect_whatsapp(number.clone(), now);
        self.persist_session(&state).await;

        if update == ContactUpdate::Unchanged {
            return update;
        }
        let previous = match &update {
            ContactUpdate::Changed { from } => Some(from.clone()),
            _ => None,
        };
        info!(
            session_id = %state.session.session_id,
            edited = previous.is_some(),
            "WhatsApp collected"
        );
        let envelope = WebhookEnvelope::new(
            WebhookEventType::WhatsappCollected,
            &state.session,
            WhatsappCollectedData {
                whatsapp: number,
                previous,
            },
            now,
        );
        drop(state);

        self.spawn_webhook(envelope);
        update
    }

    /// Send an `analyticsHeartbeat` now. Returns `None` without sending
    /// when no contact is known.
    pub async fn send_heartbeat(&self) -> Option<DeliveryOutcome> {
        let now = self.now();
        let state = self.lock().await;
        state.session.whatsapp_collected.as_ref()?;
        let envelope = WebhookEnvelope::new(
            WebhookEventType::AnalyticsHeartbeat,
            &state.session,
            state.cart.summary(),
            now,
        );
        drop(state);

        Some(self.inner.webhooks.send(&envelope).await)
    }

    // -------------------------------------------------------------------------
    // Webhooks
    // -------------------------------------------------------------------------

    /// Webhook delivery log, oldest first.
    pub async fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.inner.webhooks.deliveries().await
    }

    /// Resolved route for every event type.
    pub async fn webhook_routes(&self) -> Vec<(WebhookEventType, WebhookRoute)> {
        self.inner.webhooks.routes().await
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    async fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.inner.state.lock().await
    }

    async fn persist_cart(&self, state: &LocalState) {
        storage::persist(self.inner.store.as_ref(), CART_KEY, &state.cart).await;
    }

    async fn persist_session(&self, state: &LocalState) {
        storage::persist(self.inner.store.as_ref(), ANALYTICS_KEY, &state.session).await;
    }

    fn spawn_cart_sync(&self, sync: CartSync) {
        let backend = self.inner.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.cart_sync(&sync).await {
                warn!(session_id = %sync.session_id, error = %e, "Cart sync failed");
            }
        });
    }

    fn spawn_mark_contacted(&self, session_id: SessionId) {
        let backend = self.inner.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.mark_contacted(&session_id, true).await {
                warn!(session_id = %session_id, error = %e, "Mark contacted failed");
            }
        });
    }

    fn spawn_webhook<D>(&self, envelope: WebhookEnvelope<D>)
    where
        D: Serialize + Send + Sync + 'static,
    {
        let webhooks = self.inner.webhooks.clone();
        tokio::spawn(async move {
            webhooks.send(&envelope).await;
        });
    }

    fn spawn_sweep(&self, period: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            info!(interval = ?period, "Starting abandonment sweep");
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let storefront = Self { inner };
                let check = storefront.check_abandonment().await;
                debug!(verdict = ?check.verdict, "Abandonment sweep");
            }
        });
        self.track_background(task);
    }

    fn spawn_heartbeat(&self, period: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            info!(interval = ?period, "Starting analytics heartbeat");
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let storefront = Self { inner };
                if storefront.send_heartbeat().await.is_none() {
                    debug!("No contact yet, heartbeat skipped");
                }
            }
        });
        self.track_background(task);
    }

    fn track_background(&self, task: JoinHandle<()>) {
        self.inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    use atacado_core::{DeploymentEnvironment, Price, TierSchedule};
    use chrono::TimeZone;
    use url::Url;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{AbandonmentConfig, WebhookConfig};
    use crate::storage::MemoryStore;

    fn config() -> StorefrontConfig {
        // Nothing listens on the discard port; side effects fail quietly.
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        StorefrontConfig {
            host: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            environment: DeploymentEnvironment::Local,
            data_dir: PathBuf::from("unused"),
            backend_url: base.clone(),
            webhooks: WebhookConfig {
                test_base_url: base.clone(),
                production_base_url: base,
                signing_secret: None,
                timeout: Duration::from_millis(200),
                max_attempts: 1,
                retry_delay: Duration::ZERO,
                settings_ttl: Duration::from_secs(60),
            },
            abandonment: AbandonmentConfig {
                threshold: Duration::from_secs(1800),
                sweep_interval: Duration::from_secs(3600),
            },
            heartbeat_interval: None,
            min_order_units: 30,
            sentry_dsn: None,
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).single().unwrap(),
        ))
    }

    fn item(units: u32) -> NewLineItem {
        NewLineItem::new(
            "fone-bt",
            "Fone Bluetooth",
            Quantity::new(units),
            TierSchedule::retail(Price::from_cents(3_000)),
        )
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let clock = clock();

        let first = Storefront::init(&config(), Arc::clone(&store), clock.clone())
            .await
            .unwrap();
        first.add_item(item(4)).await;
        first.track_category_visit("Fones").await;
        let session_id = first.session().await.session_id;
        first.dispose();

        let second = Storefront::init(&config(), store, clock).await.unwrap();
        let session = second.session().await;
        assert_eq!(session.session_id, session_id);
        assert_eq!(session.cart_events.len(), 1);
        assert_eq!(session.categories_visited.len(), 1);
        assert_eq!(second.cart().await.summary.items_count, Quantity::new(4));
        second.dispose();
    }

    #[tokio::test]
    async fn test_update_and_remove_unknown_row() {
        let sf = Storefront::init(&config(), Arc::new(MemoryStore::new()), clock())
            .await
            .unwrap();
        let missing = LineItemId::new("nope");
        assert!(sf.update_quantity(&missing, 3).await.is_none());
        assert!(sf.remove_item(&missing).await.is_none());
        assert!(sf.session().await.cart_events.is_empty());
        sf.dispose();
    }

    #[tokio::test]
    async fn test_update_clamps_and_removes() {
        let sf = Storefront::init(&config(), Arc::new(MemoryStore::new()), clock())
            .await
            .unwrap();
        let view = sf.add_item(item(5)).await;
        let id = view.items.first().unwrap().id.clone();

        let view = sf.update_quantity(&id, 40).await.unwrap();
        assert!(view.checkout.allowed);

        let view = sf.update_quantity(&id, -3).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(sf.session().await.cart_events.len(), 3);
        sf.dispose();
    }
}
