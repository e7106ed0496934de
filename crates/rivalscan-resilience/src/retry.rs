//! Bounded retry with jittered exponential backoff.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry schedule for one class of remote call.
///
/// Each retry sleeps for a delay drawn uniformly from a window whose
/// ceiling doubles per attempt and is clamped to `backoff_max`, so every
/// delay lands in `[backoff_min, backoff_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            max_retries,
            backoff_min,
            backoff_max,
        }
    }

    /// Retries allowed after the initial attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Jittered delay before the retry following failed attempt `attempt`
    /// (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let floor_ms = self.backoff_min.as_millis() as u64;
        let cap_ms = self.backoff_max.as_millis() as u64;
        let ceiling_ms = floor_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(cap_ms)
            .max(floor_ms);
        let delay_ms = rand::thread_rng().gen_range(floor_ms..=ceiling_ms);
        Duration::from_millis(delay_ms)
    }

    /// Run `operation`, retrying on `Err` until the budget is spent.
    ///
    /// The final error is returned unchanged once retries are exhausted.
    /// With `max_retries = 2` the operation runs at most three times.
    pub async fn run<T, E, F, Fut>(&self, op_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt <= self.max_retries {
                        let delay = self.delay_for_attempt(attempt);
                        warn!(
                            op = op_name,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Call failed, will retry"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(error);
                }
            }
        }
    }
}
