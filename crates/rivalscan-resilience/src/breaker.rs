//! Circuit breaker for the analysis invocation path.
//!
//! The breaker opens after a run of consecutive failures and rejects
//! calls until a cooldown elapses, then admits a single probe. A
//! successful probe closes the circuit; a failed probe reopens it for a
//! fresh cooldown.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rejection issued when the breaker refuses a call without sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit open, retry in {}ms", retry_after.as_millis())]
pub struct CircuitRejection {
    /// Time left before the next probe is admitted.
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Admit or reject the next call without recording an outcome.
    ///
    /// An open breaker whose cooldown has elapsed flips to half-open and
    /// admits the caller as the probe.
    pub fn preflight(&self) -> Result<(), CircuitRejection> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match *state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.cooldown {
                    *state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(CircuitRejection {
                        retry_after: self.cooldown - elapsed,
                    })
                }
            }
            // One probe at a time while half-open
            BreakerState::HalfOpen => Err(CircuitRejection {
                retry_after: self.cooldown,
            }),
        }
    }

    /// Record the outcome of an admitted call.
    pub fn record(&self, success: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if success {
            *state = BreakerState::Closed {
                consecutive_failures: 0,
            };
            return;
        }

        *state = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    BreakerState::Open {
                        since: Instant::now(),
                    }
                } else {
                    BreakerState::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            // Failed probe reopens for a fresh cooldown
            BreakerState::HalfOpen => BreakerState::Open {
                since: Instant::now(),
            },
            open @ BreakerState::Open { .. } => open,
        };
    }

    /// Whether the breaker is currently in the open state.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*state, BreakerState::Open { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn trip(breaker: &CircuitBreaker, failures: u32) {
        for _ in 0..failures {
            breaker.record(false);
        }
    }

    #[test]
    fn stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(15));

        trip(&breaker, 2);

        assert!(!breaker.is_open());
        assert!(breaker.preflight().is_ok());
    }

    #[test]
    fn opens_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(15));

        trip(&breaker, 3);

        assert!(breaker.is_open());
        let rejection = breaker.preflight().unwrap_err();
        assert!(rejection.retry_after <= Duration::from_secs(15));
        assert!(rejection.retry_after > Duration::ZERO);
    }

    #[test]
    fn success_resets_the_failure_run() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(15));

        trip(&breaker, 2);
        breaker.record(true);
        trip(&breaker, 2);

        assert!(!breaker.is_open());
    }

    #[test]
    fn successful_probe_closes_the_circuit() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));

        trip(&breaker, 2);
        assert!(breaker.preflight().is_err());

        thread::sleep(Duration::from_millis(25));

        assert!(breaker.preflight().is_ok());
        breaker.record(true);

        assert!(!breaker.is_open());
        assert!(breaker.preflight().is_ok());
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));

        trip(&breaker, 2);
        thread::sleep(Duration::from_millis(25));

        assert!(breaker.preflight().is_ok());
        breaker.record(false);

        assert!(breaker.is_open());
        assert!(breaker.preflight().is_err());
    }

    #[test]
    fn half_open_admits_a_single_probe() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));

        trip(&breaker, 2);
        thread::sleep(Duration::from_millis(25));

        assert!(breaker.preflight().is_ok());
        assert!(breaker.preflight().is_err());
    }
}
