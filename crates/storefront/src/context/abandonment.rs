//! Abandonment detector: one owned timer plus the shared check.
//!
//! The timer, the fallback sweep and the startup catch-up all settle the
//! verdict of the pure policy the same way. On [`Verdict::Fire`] the
//! activity stamp is zeroed and persisted before the webhook goes out, so a
//! concurrent check sees an idle session.

use std::sync::{Arc, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use atacado_core::webhook::CartAbandonedData;
use atacado_core::{AbandonmentState, DeliveryOutcome, Verdict, WebhookEnvelope, WebhookEventType};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Inner, Storefront};

/// Result of one abandonment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonmentCheck {
    /// What the policy decided.
    pub verdict: Verdict,
    /// Delivery outcome when the check fired.
    pub delivery: Option<DeliveryOutcome>,
}

/// The single pending abandonment timer.
#[derive(Default)]
pub(super) struct AbandonmentTimer {
    slot: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AbandonmentTimer {
    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any pending timer with one that checks after `delay`.
    fn arm(&self, inner: Weak<Inner>, delay: Duration) {
        let mut slot = self.slot();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else { return };
            // Detached so re-arming from the check cannot cancel a delivery.
            let storefront = Storefront { inner };
            tokio::spawn(async move {
                storefront.check_abandonment().await;
            });
        }));
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub(super) fn cancel(&self) -> bool {
        self.slot()
            .take()
            .is_some_and(|handle| {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            })
    }

    fn is_armed(&self) -> bool {
        self.slot().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

/// Startup check whose delivery, if any, runs in the background.
pub(super) struct CatchUp {
    verdict: Verdict,
    delivery: Option<JoinHandle<DeliveryOutcome>>,
}

impl Storefront {
    /// Evaluate abandonment now and act on the verdict.
    ///
    /// Sends at most one `cartAbandoned` webhook per watching episode: the
    /// firing check zeroes `last_cart_activity` under the state lock, so
    /// every later check until the next cart mutation is [`Verdict::Idle`].
    pub async fn check_abandonment(&self) -> AbandonmentCheck {
        let (verdict, envelope) = self.settle_abandonment().await;
        let delivery = match envelope {
            Some(envelope) => Some(self.inner.webhooks.send(&envelope).await),
            None => None,
        };
        AbandonmentCheck { verdict, delivery }
    }

    /// Wait for the startup check made by [`Storefront::init`], including
    /// its delivery. Returns `None` once it has been collected.
    pub async fn catch_up(&self) -> Option<AbandonmentCheck> {
        let CatchUp { verdict, delivery } = self
            .inner
            .catch_up
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let delivery = match delivery {
            Some(handle) => handle.await.ok(),
            None => None,
        };
        Some(AbandonmentCheck { verdict, delivery })
    }

    /// State changes of the startup check happen before `init` returns; the
    /// delivery does not hold up startup.
    pub(super) async fn start_catch_up(&self) {
        let (verdict, envelope) = self.settle_abandonment().await;
        let delivery = envelope.map(|envelope| {
            let webhooks = self.inner.webhooks.clone();
            tokio::spawn(async move { webhooks.send(&envelope).await })
        });
        *self
            .inner
            .catch_up
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(CatchUp { verdict, delivery });
    }

    /// Apply the verdict to the persisted state. Returns the webhook to send
    /// when it fired.
    async fn settle_abandonment(&self) -> (Verdict, Option<WebhookEnvelope<CartAbandonedData>>) {
        let now = self.now();
        let mut state = self.lock().await;
        let last_cart_activity = state.session.last_cart_activity;
        let verdict = self
            .inner
            .policy
            .evaluate(last_cart_activity, state.cart.is_empty(), now);

        let envelope = match verdict {
            Verdict::Idle => None,
            Verdict::Wait(remaining) => {
                drop(state);
                self.arm_abandonment_timer(remaining);
                None
            }
            Verdict::Disarm => {
                state.session.disarm_abandonment();
                self.persist_session(&state).await;
                debug!(session_id = %state.session.session_id, "Cart emptied before threshold, disarmed");
                None
            }
            Verdict::Fire => {
                let envelope = WebhookEnvelope::new(
                    WebhookEventType::CartAbandoned,
                    &state.session,
                    CartAbandonedData::new(&state.cart, last_cart_activity),
                    now,
                );
                state.session.disarm_abandonment();
                self.persist_session(&state).await;
                info!(
                    session_id = %state.session.session_id,
                    last_cart_activity,
                    rows = state.cart.items().len(),
                    "Cart abandoned"
                );
                drop(state);

                self.inner.timer.cancel();
                Some(envelope)
            }
        };

        (verdict, envelope)
    }

    /// Detector state as persisted.
    pub async fn abandonment_state(&self) -> AbandonmentState {
        AbandonmentState::of(self.lock().await.session.last_cart_activity)
    }

    /// Whether a timer is pending.
    #[must_use]
    pub fn abandonment_timer_armed(&self) -> bool {
        self.inner.timer.is_armed()
    }

    pub(super) fn arm_abandonment_timer(&self, delay: Duration) {
        self.inner.timer.arm(Arc::downgrade(&self.inner), delay);
    }
}
