//! Retry delay computation.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fraction of the base delay added as uniform jitter.
const JITTER_FRACTION: f64 = 0.25;

/// Multiplier applied when the server answered 429.
const RATE_LIMIT_MULTIPLIER: u64 = 3;

/// Retry settings for one logical API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay_ms: u64,

    /// Upper bound for the exponential part of the delay.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Exponential delay without jitter: `min(base * 2^attempt, max)`.
pub fn base_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let millis = policy
        .base_delay_ms
        .saturating_mul(factor)
        .min(policy.max_delay_ms);
    Duration::from_millis(millis)
}

/// Delay before retrying after `attempt`, using the thread-local RNG.
pub fn delay(attempt: u32, policy: &RetryPolicy, rate_limited: bool) -> Duration {
    delay_with_rng(attempt, policy, rate_limited, &mut rand::rng())
}

/// Delay before retrying after `attempt`, drawing jitter from `rng`.
///
/// Jitter is uniform in `[0, base / 4]`. Rate-limited failures triple the
/// final value.
pub fn delay_with_rng<R: Rng>(
    attempt: u32,
    policy: &RetryPolicy,
    rate_limited: bool,
    rng: &mut R,
) -> Duration {
    let base = base_delay(attempt, policy).as_millis() as u64;
    let jitter_cap = (base as f64 * JITTER_FRACTION) as u64;
    let jitter = if jitter_cap == 0 {
        0
    } else {
        rng.random_range(0..=jitter_cap)
    };

    let mut millis = base.saturating_add(jitter);
    if rate_limited {
        millis = millis.saturating_mul(RATE_LIMIT_MULTIPLIER);
    }
    Duration::from_millis(millis)
}
