//! Client-side resilience primitives for remote invocation.
//!
//! Three guards compose around the analysis call path: a sliding-window
//! [`RateLimiter`] keyed by operation, a [`CircuitBreaker`] that trips on
//! consecutive failures, and a [`RetryPolicy`] with jittered backoff.
//! Admission runs limiter first, then breaker, then the retried call, so
//! a saturated window never consumes a breaker probe and a tripped
//! breaker never burns retry budget.

pub mod breaker;
pub mod limiter;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitRejection};
pub use limiter::{RateLimitRejection, RateLimiter};
pub use retry::RetryPolicy;
