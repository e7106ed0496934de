//! Local progress subscription registry.
//!
//! Subscriptions are process-local bookkeeping: the orchestrator emits an
//! event for the progress transitions it writes itself (run started, run
//! failed). Server-driven transitions are not delivered here; a remote push
//! channel would implement the same surface.

use rivalscan_utils::types::ProgressStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One progress transition for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProgressEvent {
    /// Event for a freshly created progress row.
    #[must_use]
    pub fn started(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: ProgressStatus::Pending,
            error_message: None,
        }
    }

    /// Event for a run the orchestrator marked failed.
    #[must_use]
    pub fn failed(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: ProgressStatus::Failed,
            error_message: Some(message.into()),
        }
    }
}

type Callback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    next_token: u64,
    subscribers: HashMap<String, Vec<(u64, Callback)>>,
}

/// Registry of per-session progress callbacks.
///
/// Cheap to clone; clones share the subscriber table.
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ProgressRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `callback` for events on `session_id`.
    ///
    /// The returned guard unsubscribes when dropped or via
    /// [`ProgressSubscription::unsubscribe`].
    pub fn subscribe(
        &self,
        session_id: impl Into<String>,
        callback: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> ProgressSubscription {
        let session_id = session_id.into();
        let mut state = self.state();

        state.next_token += 1;
        let token = state.next_token;
        state
            .subscribers
            .entry(session_id.clone())
            .or_default()
            .push((token, Arc::new(callback)));
        debug!(session_id = %session_id, token = token, "Progress subscription added");

        ProgressSubscription {
            registry: self.clone(),
            session_id,
            token,
            active: true,
        }
    }

    /// Deliver `event` to every subscriber of its session.
    ///
    /// Callbacks run outside the registry lock, so a callback may subscribe
    /// or unsubscribe without deadlocking.
    pub fn emit(&self, event: &ProgressEvent) {
        let callbacks: Vec<Callback> = {
            let state = self.state();
            state
                .subscribers
                .get(&event.session_id)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(event);
        }
    }

    /// Live subscriptions for `session_id`.
    #[must_use]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.state()
            .subscribers
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn remove(&self, session_id: &str, token: u64) {
        let mut state = self.state();

        if let Some(subs) = state.subscribers.get_mut(session_id) {
            subs.retain(|(t, _)| *t != token);
            if subs.is_empty() {
                state.subscribers.remove(session_id);
            }
        }
        debug!(session_id = %session_id, token = token, "Progress subscription removed");
    }
}

/// Guard for one registered callback.
pub struct ProgressSubscription {
    registry: ProgressRegistry,
    session_id: String,
    token: u64,
    active: bool,
}

impl ProgressSubscription {
    /// Session this subscription listens on.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Remove the callback now instead of at drop time.
    pub fn unsubscribe(mut self) {
        self.remove_once();
    }

    fn remove_once(&mut self) {
        if self.active {
            self.active = false;
            self.registry.remove(&self.session_id, self.token);
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.remove_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_subscriber(
        registry: &ProgressRegistry,
        session_id: &str,
    ) -> (ProgressSubscription, Arc<Mutex<Vec<ProgressEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = registry.subscribe(session_id, move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        (subscription, seen)
    }

    #[test]
    fn events_reach_matching_subscribers_only() {
        let registry = ProgressRegistry::new();
        let (_sub_a, seen_a) = recording_subscriber(&registry, "s1");
        let (_sub_b, seen_b) = recording_subscriber(&registry, "s2");

        registry.emit(&ProgressEvent::started("s1"));

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[test]
    fn every_subscriber_of_a_session_is_notified() {
        let registry = ProgressRegistry::new();
        let (_sub_a, seen_a) = recording_subscriber(&registry, "s1");
        let (_sub_b, seen_b) = recording_subscriber(&registry, "s1");

        registry.emit(&ProgressEvent::failed("s1", "provider exploded"));

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert_eq!(seen_b.lock().unwrap().len(), 1);
        assert_eq!(
            seen_a.lock().unwrap()[0].error_message.as_deref(),
            Some("provider exploded")
        );
    }

    #[test]
    fn dropping_the_guard_unsubscribes() {
        let registry = ProgressRegistry::new();
        let (subscription, seen) = recording_subscriber(&registry, "s1");
        assert_eq!(registry.subscriber_count("s1"), 1);

        drop(subscription);

        assert_eq!(registry.subscriber_count("s1"), 0);
        registry.emit(&ProgressEvent::started("s1"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn explicit_unsubscribe_matches_drop() {
        let registry = ProgressRegistry::new();
        let (subscription, _seen) = recording_subscriber(&registry, "s1");

        subscription.unsubscribe();

        assert_eq!(registry.subscriber_count("s1"), 0);
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let registry = ProgressRegistry::new();
        registry.emit(&ProgressEvent::started("nobody-listens"));
    }
}
