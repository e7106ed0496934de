//! Sliding-window rate limiter keyed by operation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rejection issued when a window has no call slots left.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit reached for {key}, retry in {}ms", retry_after.as_millis())]
pub struct RateLimitRejection {
    /// Limiter key that was saturated.
    pub key: String,
    /// Time until the oldest call in the window ages out.
    pub retry_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a call slot under `key`.
    ///
    /// Timestamps older than the window are pruned on every claim, so a
    /// burst that has aged out no longer counts against the limit. A
    /// rejected claim records nothing.
    pub fn try_acquire(&self, key: &str) -> Result<(), RateLimitRejection> {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let window_calls = calls.entry(key.to_string()).or_default();

        while let Some(oldest) = window_calls.front() {
            if now.duration_since(*oldest) >= self.window {
                window_calls.pop_front();
            } else {
                break;
            }
        }

        if window_calls.len() < self.max_calls {
            window_calls.push_back(now);
            return Ok(());
        }

        let retry_after = window_calls
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or_default();

        Err(RateLimitRejection {
            key: key.to_string(),
            retry_after,
        })
    }

    /// Calls currently counted against `key`.
    #[must_use]
    pub fn in_window(&self, key: &str) -> usize {
        let now = Instant::now();
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());

        calls
            .get(key)
            .map(|window_calls| {
                window_calls
                    .iter()
                    .filter(|at| now.duration_since(**at) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn allows_calls_up_to_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));

        for _ in 0..3 {
            assert!(limiter.try_acquire("edge:competitor-analysis").is_ok());
        }

        let rejection = limiter.try_acquire("edge:competitor-analysis").unwrap_err();
        assert_eq!(rejection.key, "edge:competitor-analysis");
        assert!(rejection.retry_after <= Duration::from_secs(10));
        assert_eq!(limiter.in_window("edge:competitor-analysis"), 3);
    }

    #[test]
    fn rejection_does_not_consume_a_slot() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));

        assert!(limiter.try_acquire("op").is_ok());
        assert!(limiter.try_acquire("op").is_err());
        assert!(limiter.try_acquire("op").is_err());

        assert_eq!(limiter.in_window("op"), 1);
    }

    #[test]
    fn window_slides_forward() {
        let limiter = RateLimiter::new(2, Duration::from_millis(30));

        assert!(limiter.try_acquire("op").is_ok());
        assert!(limiter.try_acquire("op").is_ok());
        assert!(limiter.try_acquire("op").is_err());

        thread::sleep(Duration::from_millis(35));

        assert!(limiter.try_acquire("op").is_ok());
        assert_eq!(limiter.in_window("op"), 1);
    }

    #[test]
    fn keys_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));

        assert!(limiter.try_acquire("a").is_ok());
        assert!(limiter.try_acquire("b").is_ok());
        assert!(limiter.try_acquire("a").is_err());
        assert!(limiter.try_acquire("b").is_err());
    }

    #[test]
    fn unknown_key_counts_zero() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        assert_eq!(limiter.in_window("never-used"), 0);
    }
}
