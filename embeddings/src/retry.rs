//! Request execution state machine.
//!
//! A logical call moves through `Attempting(n)` until it lands in one of the
//! terminal states `Success`, `FailedFast` or `Exhausted`. The driver is
//! transport-agnostic: it takes a closure producing one attempt, so the retry
//! rules can be exercised without an HTTP server.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backoff::{RetryPolicy, delay_with_rng};
use crate::error::{EmbeddingError, FailureKind, Result};

/// State of a logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Zero-based attempt in flight.
    Attempting(u32),
    Success,
    FailedFast,
    Exhausted,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Sleep for `delay`, then move to `Attempting(next_attempt)`.
    Retry { next_attempt: u32, delay: Duration },
    /// Non-retryable failure.
    FailFast,
    /// Retryable failure with no budget left.
    GiveUp,
}

/// Decide the transition out of `Attempting(attempt)` after a failure.
pub fn decide<R: Rng>(
    attempt: u32,
    kind: FailureKind,
    policy: &RetryPolicy,
    rng: &mut R,
) -> Transition {
    match kind {
        FailureKind::Fatal => Transition::FailFast,
        FailureKind::Retryable { .. } if attempt >= policy.max_retries => Transition::GiveUp,
        FailureKind::Retryable { rate_limited } => Transition::Retry {
            next_attempt: attempt + 1,
            delay: delay_with_rng(attempt, policy, rate_limited, rng),
        },
    }
}

/// Terminal result of [`run_with_retry`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, attempts: u32 },
    FailedFast { error: EmbeddingError, attempts: u32 },
    Exhausted { error: EmbeddingError, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn state(&self) -> RetryState {
        match self {
            Self::Success { .. } => RetryState::Success,
            Self::FailedFast { .. } => RetryState::FailedFast,
            Self::Exhausted { .. } => RetryState::Exhausted,
        }
    }

    /// Number of attempts that were issued.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::FailedFast { attempts, .. }
            | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Collapse into a `Result`. An exhausted call keeps its last error
    /// wrapped with the attempt count.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::FailedFast { error, .. } => Err(error),
            Self::Exhausted { error, attempts } => Err(EmbeddingError::Exhausted {
                attempts,
                last: Box::new(error),
            }),
        }
    }
}

/// A scheduled retry, as reported to observers.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// Zero-based attempt that just failed.
    pub attempt: u32,
    /// Backoff before the next attempt.
    pub delay: Duration,
    pub error: &'a EmbeddingError,
}

/// Telemetry hook invoked once per scheduled retry.
///
/// Implementations must not block. A panicking observer is caught and
/// ignored.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_>);
}

/// Default observer that logs retries through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        warn!(
            attempt = event.attempt + 1,
            delay_ms = event.delay.as_millis() as u64,
            "API request failed, retrying: {}",
            event.error
        );
    }
}

fn notify(observer: &dyn RetryObserver, event: &RetryEvent<'_>) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_retry(event)));
    if result.is_err() {
        warn!("retry observer panicked; continuing");
    }
}

/// Drive `op` through the retry state machine.
///
/// `op` receives the zero-based attempt number. When `cancel` fires, the
/// in-flight attempt or backoff sleep is abandoned and the call fails fast
/// with [`EmbeddingError::Cancelled`].
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // Terminal states return from inside the loop; only `Attempting(n)`
    // is carried between iterations.
    let mut attempt = 0;

    loop {
        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(EmbeddingError::Cancelled),
                result = op(attempt) => result,
            },
            None => op(attempt).await,
        };

        let error = match result {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt + 1,
                };
            }
            Err(error) => error,
        };

        let transition = decide(attempt, error.kind(), policy, &mut rand::rng());
        match transition {
            Transition::FailFast => {
                return RetryOutcome::FailedFast {
                    error,
                    attempts: attempt + 1,
                };
            }
            Transition::GiveUp => {
                return RetryOutcome::Exhausted {
                    error,
                    attempts: attempt + 1,
                };
            }
            Transition::Retry {
                next_attempt,
                delay,
            } => {
                notify(
                    observer,
                    &RetryEvent {
                        attempt,
                        delay,
                        error: &error,
                    },
                );

                match cancel {
                    Some(token) => {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                return RetryOutcome::FailedFast {
                                    error: EmbeddingError::Cancelled,
                                    attempts: attempt + 1,
                                };
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }

                attempt = next_attempt;
            }
        }
    }
}
