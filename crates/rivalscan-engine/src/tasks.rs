//! Tracked background tasks.
//!
//! Post-save enrichment and aggregation run off the caller's critical path,
//! but they are spawned through this registry rather than detached, so their
//! completion and failure stay observable. Callers drain the registry before
//! process exit to collect outcomes.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Terminal state of one drained task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: String,
    /// `None` on success; the failure or panic text otherwise.
    pub error: Option<String>,
}

impl TaskOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Registry of named spawned tasks.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<(String, JoinHandle<Result<(), String>>)>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, Vec<(String, JoinHandle<Result<(), String>>)>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `future` onto the runtime and track it under `name`.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "Background task spawned");
        let handle = tokio::spawn(future);
        self.handles().push((name, handle));
    }

    /// Tasks spawned and not yet drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handles().len()
    }

    /// Await every tracked task and report outcomes in spawn order.
    ///
    /// Failures and panics become outcomes, never propagated errors; the
    /// background work is best-effort by contract.
    pub async fn drain(&self) -> Vec<TaskOutcome> {
        let handles = std::mem::take(&mut *self.handles());
        let mut outcomes = Vec::with_capacity(handles.len());

        for (name, handle) in handles {
            let error = match handle.await {
                Ok(Ok(())) => None,
                Ok(Err(message)) => {
                    warn!(task = %name, error = %message, "Background task failed");
                    Some(message)
                }
                Err(join_error) => {
                    let message = format!("task aborted: {join_error}");
                    warn!(task = %name, error = %message, "Background task did not finish");
                    Some(message)
                }
            };
            outcomes.push(TaskOutcome { name, error });
        }

        outcomes
    }
}
