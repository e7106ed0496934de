//! Client-side orchestration for competitor analysis runs.
//!
//! [`AnalysisOrchestrator`] is the single entry point: it owns the result
//! cache, the rate limiter and circuit breaker guarding the analysis edge
//! function, the tracked background tasks, and the progress subscriptions.
//! Construct one with [`OrchestratorBuilder`], injecting the session
//! provider, store, and gateway ports from `rivalscan-remote`.

pub mod cache;
pub mod orchestrator;
pub mod progress;
pub mod tasks;

pub use cache::{AnalysisCache, BoundedCache, CacheKey, CacheStats};
pub use orchestrator::{AnalysisOrchestrator, OrchestratorBuilder};
pub use progress::{ProgressEvent, ProgressRegistry, ProgressSubscription};
pub use tasks::{BackgroundTasks, TaskOutcome};
