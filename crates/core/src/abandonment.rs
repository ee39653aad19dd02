//! Cart abandonment policy.
//!
//! The decision whether an abandoned-cart notification is due lives here and
//! nowhere else. The storefront's one-shot timer, its periodic sweep and the
//! startup catch-up all call [`AbandonmentPolicy::evaluate`] and act on the
//! returned [`Verdict`].
//!
//! ```text
//!   idle ──cart mutation──▶ watching ──mutation──▶ watching (restart)
//!    ▲                         │
//!    │                         ├── threshold, cart non-empty ──▶ fired ─┐
//!    │                         └── order / clear / empty cart ──────────┤
//!    └───────────────── last_cart_activity = 0 ◀────────────────────────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Observable detector state, derived from `last_cart_activity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbandonmentState {
    /// Nothing armed.
    Idle,
    /// Counting down toward the threshold.
    Watching,
}

impl AbandonmentState {
    /// State for a persisted `last_cart_activity` value.
    #[must_use]
    pub const fn of(last_cart_activity: i64) -> Self {
        if last_cart_activity == 0 {
            Self::Idle
        } else {
            Self::Watching
        }
    }
}

/// What to do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing is armed.
    Idle,
    /// Threshold not reached yet; check again after `remaining`.
    Wait(Duration),
    /// Threshold reached with items in the cart: send once, then disarm.
    Fire,
    /// Threshold reached but the cart is empty: disarm without sending.
    Disarm,
}

/// Abandonment threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbandonmentPolicy {
    threshold: Duration,
}

impl AbandonmentPolicy {
    /// Thirty minutes.
    pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(30 * 60);

    /// Policy firing after `threshold` of cart inactivity.
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Decide for the given persisted state.
    ///
    /// `last_cart_activity` is epoch milliseconds, zero when disarmed. An
    /// activity stamped in the future waits the full threshold.
    #[must_use]
    pub fn evaluate(&self, last_cart_activity: i64, cart_is_empty: bool, now: DateTime<Utc>) -> Verdict {
        if last_cart_activity == 0 {
            return Verdict::Idle;
        }

        let elapsed = now.timestamp_millis().saturating_sub(last_cart_activity);
        let elapsed = u64::try_from(elapsed).unwrap_or(0);
        let elapsed = Duration::from_millis(elapsed);

        if elapsed < self.threshold {
            return Verdict::Wait(self.threshold - elapsed);
        }
        if cart_is_empty {
            Verdict::Disarm
        } else {
            Verdict::Fire
        }
    }
}

impl Default for AbandonmentPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(NOW).unwrap()
    }

    fn policy() -> AbandonmentPolicy {
        AbandonmentPolicy::new(Duration::from_secs(60))
    }

    #[test]
    fn test_idle_when_disarmed() {
        assert_eq!(policy().evaluate(0, false, now()), Verdict::Idle);
        assert_eq!(AbandonmentState::of(0), AbandonmentState::Idle);
    }

    #[test]
    fn test_wait_reports_remaining() {
        let verdict = policy().evaluate(NOW - 15_000, false, now());
        assert_eq!(verdict, Verdict::Wait(Duration::from_secs(45)));
        assert_eq!(AbandonmentState::of(NOW - 15_000), AbandonmentState::Watching);
    }

    #[test]
    fn test_fires_one_millisecond_past_threshold() {
        assert_eq!(policy().evaluate(NOW - 60_001, false, now()), Verdict::Fire);
    }

    #[test]
    fn test_fires_exactly_at_threshold() {
        assert_eq!(policy().evaluate(NOW - 60_000, false, now()), Verdict::Fire);
    }

    #[test]
    fn test_empty_cart_disarms_instead_of_firing() {
        assert_eq!(policy().evaluate(NOW - 120_000, true, now()), Verdict::Disarm);
    }

    #[test]
    fn test_corrupt_stamps_do_not_overflow() {
        assert_eq!(policy().evaluate(i64::MIN, false, now()), Verdict::Fire);
        assert_eq!(
            policy().evaluate(i64::MAX, false, now()),
            Verdict::Wait(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_future_activity_waits_full_threshold() {
        assert_eq!(
            policy().evaluate(NOW + 5_000, false, now()),
            Verdict::Wait(Duration::from_secs(60))
        );
    }
}
