//! Bounded retry with exponential backoff around fallible async calls.
//!
//! Wraps remote calls (model inference, capability invocations) that fail
//! transiently under load. Transient errors are retried up to a ceiling
//! with purely exponential sleeps (base, 2x base, 4x base, ...); fatal
//! errors (malformed request, auth) fail immediately.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry ceiling and backoff timing for one class of remote call.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Sleep after the first failure; doubles after each subsequent one.
    pub base_delay: Duration,
    /// Optional per-attempt deadline. An attempt that exceeds it counts as
    /// a transient failure, eligible for the remaining retries.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: None,
        }
    }
}

/// Error from [`retry_with_backoff`].
#[derive(Debug, Error)]
pub enum RetryError<E: Display + Debug> {
    /// The operation failed with an error the classifier marked
    /// non-retryable; exactly one attempt was made for it.
    #[error("{0}")]
    Fatal(E),

    /// Every attempt failed transiently.
    #[error("'{operation}' failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    /// The owner cancelled the run while waiting to retry.
    #[error("'{operation}' cancelled during retry backoff")]
    Cancelled { operation: String },
}

/// Runs `op` up to `policy.max_attempts` times, sleeping
/// `base_delay * 2^attempt` between transient failures.
///
/// `is_transient` decides whether an error is worth retrying; a `false`
/// verdict fails immediately with [`RetryError::Fatal`]. When `cancel` is
/// set, an owner cancellation interrupts the backoff sleep.
///
/// **Interaction**: the structured output pipeline wraps model calls with
/// this; the chat executor wraps capability calls. Timing is asserted in
/// tests under a paused tokio clock.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + Debug,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        let outcome = match policy.attempt_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, op()).await {
                Ok(result) => result.map_err(Some),
                // Deadline exceeded: transient by definition.
                Err(_) => Err(None),
            },
            None => op().await.map_err(Some),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(Some(err)) if !is_transient(&err) => return Err(RetryError::Fatal(err)),
            Err(err) => {
                last_error = match err {
                    Some(e) => e.to_string(),
                    None => "attempt deadline exceeded".to_string(),
                };
            }
        }

        if attempt + 1 == attempts {
            break;
        }

        let delay = policy.base_delay * 2u32.saturating_pow(attempt);
        warn!(
            operation,
            attempt = attempt + 1,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %last_error,
            "transient failure, backing off"
        );
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(RetryError::Cancelled {
                            operation: operation.to_string(),
                        })
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    Err(RetryError::Exhausted {
        operation: operation.to_string(),
        attempts,
        last_error,
    })
}

/// Heuristic classifier for stringly-typed remote errors: overload and
/// availability signals are transient, everything else is not.
pub fn transient_signal(message: &str) -> bool {
    let lower = message.to_lowercase();
    const SIGNALS: [&str; 9] = [
        "rate limit",
        "rate limited",
        "overloaded",
        "unavailable",
        "timeout",
        "timed out",
        "429",
        "502",
        "503",
    ];
    SIGNALS.iter().any(|s| lower.contains(s))
}
