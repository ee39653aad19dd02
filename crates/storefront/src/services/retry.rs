//! Bounded fixed-delay retry shared by every outbound side channel.
//!
//! Built on `backon`: [`RetryPolicy`] maps to a [`ConstantBuilder`] and
//! [`execute_with_retry`] retries only errors that report themselves as
//! [`Transient`].

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tracing::{debug, warn};

/// Classifies errors worth another attempt.
pub trait Transient {
    /// Whether a retry may succeed.
    fn is_transient(&self) -> bool;
}

/// Attempt budget and delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy with `max_attempts` (minimum one) and a fixed `delay`.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Fixed-delay backoff allowing `max_attempts - 1` retries.
    #[must_use]
    pub fn backoff(&self) -> ConstantBuilder {
        let retries = usize::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(usize::MAX);
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(retries)
    }
}

/// Why an operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: E,
    },
    /// An attempt failed with an error that retrying cannot fix.
    Permanent {
        /// Attempts made.
        attempts: u32,
        /// The error.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Permanent { attempts, .. } => *attempts,
        }
    }

    /// The final error.
    pub fn into_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Permanent { error, .. } => error,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or the policy's
/// attempts are spent. On success, returns the value and the attempts used.
///
/// # Errors
///
/// Returns [`RetryError`] describing the last failure.
pub async fn execute_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<(T, u32), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let attempts = AtomicU32::new(0);
    let result = (|| {
        attempts.fetch_add(1, Ordering::Relaxed);
        operation()
    })
    .retry(policy.backoff())
    .when(|error: &E| error.is_transient())
    .notify(|error: &E, delay: Duration| {
        warn!(
            operation = operation_name,
            attempt = attempts.load(Ordering::Relaxed),
            max_attempts = policy.max_attempts,
            retry_in = ?delay,
            error = %error,
            "Attempt failed, retrying"
        );
    })
    .await;

    let attempts = attempts.load(Ordering::Relaxed);
    match result {
        Ok(value) => {
            if attempts > 1 {
                debug!(operation = operation_name, attempts, "Succeeded after retry");
            }
            Ok((value, attempts))
        }
        Err(error) if error.is_transient() => Err(RetryError::Exhausted {
            attempts,
            last_error: error,
        }),
        Err(error) => Err(RetryError::Permanent { attempts, error }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct TestError(bool);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transient={}", self.0)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = execute_with_retry(&policy(), "test", move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(TestError(true))
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, ("done", 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempt_budget() {
        let result: Result<((), u32), _> =
            execute_with_retry(&policy(), "test", || async { Err(TestError(true)) }).await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<((), u32), _> = execute_with_retry(&policy(), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(false)) }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<((), u32), _> = execute_with_retry(&RetryPolicy::once(), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(true)) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), RetryError::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
