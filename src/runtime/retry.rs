//! Exponential backoff for provider rate-limit errors
//!
//! Only [`Error::RateLimited`](crate::error::Error::RateLimited) is retried.
//! Every other error propagates on first occurrence.

use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default first backoff delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default attempt cap (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default jitter fraction (delay scaled by a factor in `[0.5, 1.5]`)
pub const DEFAULT_JITTER: f64 = 0.5;

/// Retry/backoff policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Jitter fraction in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub const fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_attempts: 1,
            jitter: 0.0,
        }
    }

    /// Un-jittered delay after `attempt` (1-based) failed
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        self.base_delay.saturating_mul(1_u32 << exp)
    }

    /// Jittered delay after `attempt` (1-based) failed
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let jitter = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }

    /// Run `op`, retrying rate-limit errors with backoff.
    ///
    /// `what` names the operation in retry logs.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_rate_limited() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
