//! The analysis orchestrator and its construction.
//!
//! [`AnalysisOrchestrator`] drives every operation against the remote
//! backend: listing and mutating saved analyses, provider and key checks,
//! and the gated start-analysis workflow in [`workflow`]. All collaborators
//! are injected at construction through [`OrchestratorBuilder`]; nothing is
//! process-global, so tests run against in-memory doubles.

mod workflow;

use crate::cache::{AnalysisCache, BoundedCache, CacheKey, CacheStats};
use crate::progress::{ProgressRegistry, ProgressSubscription};
use crate::tasks::{BackgroundTasks, TaskOutcome};
use chrono::Utc;
use rivalscan_config::config::{
    DEFAULT_BREAKER_COOLDOWN_SECS, DEFAULT_BREAKER_FAILURE_THRESHOLD, DEFAULT_CACHE_CAPACITY,
    DEFAULT_COST_PER_PROVIDER_COMPETITOR, DEFAULT_INVOKE_BACKOFF_MAX_MS,
    DEFAULT_INVOKE_BACKOFF_MIN_MS, DEFAULT_INVOKE_MAX_RETRIES, DEFAULT_RATE_LIMIT_MAX_CALLS,
    DEFAULT_RATE_LIMIT_WINDOW_SECS, DEFAULT_READ_BACKOFF_MAX_MS, DEFAULT_READ_BACKOFF_MIN_MS,
    DEFAULT_READ_MAX_RETRIES,
};
use rivalscan_config::Config;
use rivalscan_remote::ports::{
    AnalysisStore, FunctionGateway, SessionProvider, FN_AGGREGATE_ANALYSIS,
    FN_ENRICH_MASTER_PROFILE, FN_KEY_MANAGER,
};
use rivalscan_resilience::{CircuitBreaker, RateLimiter, RetryPolicy};
use rivalscan_utils::error::{GatewayError, OrchestratorError, StoreError};
use rivalscan_utils::types::{
    AnalysisDraft, AnalysisExport, AnalysisUpdate, KeyRequirements, ProviderKeyStatus,
    ProviderKind, SavedAnalysis, Session, RUN_TYPE_COMPETITOR_ANALYSIS,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

pub use crate::progress::ProgressEvent;

/// Builder for [`AnalysisOrchestrator`].
///
/// Session provider, store, and gateway are mandatory and supplied up
/// front; everything else defaults to the documented production settings
/// and can be overridden per piece or wholesale from a [`Config`].
pub struct OrchestratorBuilder {
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn AnalysisStore>,
    gateway: Arc<dyn FunctionGateway>,
    cache: Option<Arc<dyn AnalysisCache>>,
    cache_capacity: usize,
    limiter: Option<Arc<RateLimiter>>,
    rate_limit_max_calls: usize,
    rate_limit_window: Duration,
    breaker: Option<Arc<CircuitBreaker>>,
    breaker_threshold: u32,
    breaker_cooldown: Duration,
    invoke_retry: RetryPolicy,
    read_retry: RetryPolicy,
    run_type: String,
    cost_per_provider_competitor: f64,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new(
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn AnalysisStore>,
        gateway: Arc<dyn FunctionGateway>,
    ) -> Self {
        Self {
            session,
            store,
            gateway,
            cache: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            limiter: None,
            rate_limit_max_calls: DEFAULT_RATE_LIMIT_MAX_CALLS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            breaker: None,
            breaker_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            breaker_cooldown: Duration::from_secs(DEFAULT_BREAKER_COOLDOWN_SECS),
            invoke_retry: RetryPolicy::new(
                DEFAULT_INVOKE_MAX_RETRIES,
                Duration::from_millis(DEFAULT_INVOKE_BACKOFF_MIN_MS),
                Duration::from_millis(DEFAULT_INVOKE_BACKOFF_MAX_MS),
            ),
            read_retry: RetryPolicy::new(
                DEFAULT_READ_MAX_RETRIES,
                Duration::from_millis(DEFAULT_READ_BACKOFF_MIN_MS),
                Duration::from_millis(DEFAULT_READ_BACKOFF_MAX_MS),
            ),
            run_type: RUN_TYPE_COMPETITOR_ANALYSIS.to_string(),
            cost_per_provider_competitor: DEFAULT_COST_PER_PROVIDER_COMPETITOR,
        }
    }

    /// Builder with every tunable taken from `config`.
    #[must_use]
    pub fn from_config(
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn AnalysisStore>,
        gateway: Arc<dyn FunctionGateway>,
        config: &Config,
    ) -> Self {
        Self::new(session, store, gateway)
            .cache_capacity(config.cache_capacity())
            .rate_limit(config.rate_limit_max_calls(), config.rate_limit_window())
            .breaker_settings(config.breaker_failure_threshold(), config.breaker_cooldown())
            .invoke_retry(RetryPolicy::new(
                config.invoke_max_retries(),
                config.invoke_backoff_min(),
                config.invoke_backoff_max(),
            ))
            .read_retry(RetryPolicy::new(
                config.read_max_retries(),
                config.read_backoff_min(),
                config.read_backoff_max(),
            ))
            .run_type(config.run_type())
            .cost_per_provider_competitor(config.cost_per_provider_competitor())
    }

    /// Swap in a cache implementation; takes precedence over
    /// [`cache_capacity`](Self::cache_capacity).
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Capacity of the default bounded cache.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Share a rate limiter instead of building one.
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Window budget for the default rate limiter.
    #[must_use]
    pub fn rate_limit(mut self, max_calls: usize, window: Duration) -> Self {
        self.rate_limit_max_calls = max_calls;
        self.rate_limit_window = window;
        self
    }

    /// Share a circuit breaker instead of building one.
    #[must_use]
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Threshold and cooldown for the default circuit breaker.
    #[must_use]
    pub fn breaker_settings(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.breaker_threshold = failure_threshold;
        self.breaker_cooldown = cooldown;
        self
    }

    /// Retry schedule for the analysis invocation path.
    #[must_use]
    pub fn invoke_retry(mut self, policy: RetryPolicy) -> Self {
        self.invoke_retry = policy;
        self
    }

    /// Retry schedule for read paths.
    #[must_use]
    pub fn read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Run type recorded on run-log rows.
    #[must_use]
    pub fn run_type(mut self, run_type: impl Into<String>) -> Self {
        self.run_type = run_type.into();
        self
    }

    /// Per-provider-per-competitor cost estimate in USD.
    #[must_use]
    pub fn cost_per_provider_competitor(mut self, cost: f64) -> Self {
        self.cost_per_provider_competitor = cost;
        self
    }

    #[must_use]
    pub fn build(self) -> AnalysisOrchestrator {
        let cache_capacity = self.cache_capacity;
        let rate_limit_max_calls = self.rate_limit_max_calls;
        let rate_limit_window = self.rate_limit_window;
        let breaker_threshold = self.breaker_threshold;
        let breaker_cooldown = self.breaker_cooldown;

        AnalysisOrchestrator {
            session: self.session,
            store: self.store,
            gateway: self.gateway,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(BoundedCache::new(cache_capacity))),
            limiter: self.limiter.unwrap_or_else(|| {
                Arc::new(RateLimiter::new(rate_limit_max_calls, rate_limit_window))
            }),
            breaker: self.breaker.unwrap_or_else(|| {
                Arc::new(CircuitBreaker::new(breaker_threshold, breaker_cooldown))
            }),
            invoke_retry: self.invoke_retry,
            read_retry: self.read_retry,
            tasks: BackgroundTasks::new(),
            progress: ProgressRegistry::new(),
            run_type: self.run_type,
            cost_per_provider_competitor: self.cost_per_provider_competitor,
        }
    }
}

/// Coordinates the lifecycle of competitor-analysis runs against the
/// remote backend.
///
/// One instance is shared across an application; all methods take `&self`
/// and the only process-local mutable state is the result cache, the task
/// registry, and the progress subscriptions, each behind its own lock.
pub struct AnalysisOrchestrator {
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn AnalysisStore>,
    gateway: Arc<dyn FunctionGateway>,
    cache: Arc<dyn AnalysisCache>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    invoke_retry: RetryPolicy,
    read_retry: RetryPolicy,
    tasks: BackgroundTasks,
    progress: ProgressRegistry,
    run_type: String,
    cost_per_provider_competitor: f64,
}

impl AnalysisOrchestrator {
    /// Saved analyses of the current user, newest ordering left to the
    /// backend.
    ///
    /// Fails open to an empty list when nobody is signed in or when the
    /// backend answers with a permission error, so read surfaces never
    /// break on auth edge cases. Transient errors are retried on the read
    /// schedule before propagating.
    pub async fn get_analyses(&self) -> Result<Vec<SavedAnalysis>, OrchestratorError> {
        let Some(session) = self.session.current_session().await else {
            debug!("No session; listing no analyses");
            return Ok(Vec::new());
        };

        let result = self
            .read_retry
            .run("list-analyses", || {
                self.store.list_analyses(&session.user_id)
            })
            .await;

        match result {
            Ok(rows) => Ok(rows),
            Err(error) if error.is_permission_denied() => {
                warn!(error = %error, "Backend denied the analysis list; treating as empty");
                Ok(Vec::new())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Single analysis by row id or alternate analysis id.
    ///
    /// Cache-first; a miss re-fetches the full list and searches it, since
    /// the backend exposes no single-row path. A found row missing its
    /// combined aggregation section gets a best-effort merge from the
    /// aggregate table before being cached.
    pub async fn get_analysis_by_id(
        &self,
        id: &str,
    ) -> Result<Option<SavedAnalysis>, OrchestratorError> {
        let key = CacheKey::analysis(id);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached));
        }

        let rows = self.get_analyses().await?;
        let Some(mut found) = rows.into_iter().find(|row| row.matches_id(id)) else {
            return Ok(None);
        };

        if !found.analysis_data.has_combined() {
            if let Some(session) = self.session.current_session().await {
                match self
                    .store
                    .fetch_combined_aggregate(&session.user_id, &found.id)
                    .await
                {
                    Ok(Some(combined)) => found.analysis_data.combined = Some(combined),
                    Ok(None) => {}
                    Err(error) => {
                        warn!(
                            analysis_id = %found.id,
                            error = %error,
                            "Combined aggregate lookup failed; returning the row as is"
                        );
                    }
                }
            }
        }

        self.cache.put(key, found.clone());
        Ok(Some(found))
    }

    /// Persist an analysis result for `session_id`, updating the existing
    /// row when one exists.
    ///
    /// At most one row exists per (user, session); the write goes through
    /// a lookup-then-update/insert. Both cache keys for the row are
    /// invalidated, then profile enrichment and legacy aggregation are
    /// scheduled as one tracked background task.
    pub async fn save_analysis(
        &self,
        session_id: &str,
        draft: AnalysisDraft,
    ) -> Result<SavedAnalysis, OrchestratorError> {
        let session = self.require_session().await?;

        let existing = self
            .store
            .find_analysis_by_session(&session.user_id, session_id)
            .await?;

        let saved = match existing {
            Some(row) => {
                debug!(
                    session_id = %session_id,
                    analysis_id = %row.id,
                    "Updating existing analysis row"
                );
                let update = AnalysisUpdate {
                    name: draft.name,
                    description: draft.description,
                    analysis_data: Some(draft.analysis_data),
                    status: draft.status,
                };
                self.store
                    .update_analysis(&session.user_id, &row.id, &update)
                    .await?
            }
            None => {
                debug!(session_id = %session_id, "Inserting new analysis row");
                self.store
                    .insert_analysis(&session.user_id, session_id, &draft)
                    .await?
            }
        };

        self.cache.invalidate(&CacheKey::analysis(&saved.id));
        self.cache.invalidate(&CacheKey::session(session_id));

        self.schedule_post_save(saved.id.clone());
        Ok(saved)
    }

    /// Apply a partial update to an owned analysis row.
    pub async fn update_analysis(
        &self,
        id: &str,
        update: AnalysisUpdate,
    ) -> Result<SavedAnalysis, OrchestratorError> {
        let session = self.require_session().await?;

        let updated = self
            .store
            .update_analysis(&session.user_id, id, &update)
            .await?;

        self.cache.invalidate(&CacheKey::analysis(id));
        self.cache.invalidate(&CacheKey::session(&updated.session_id));
        Ok(updated)
    }

    /// Delete an owned analysis row, returning it.
    pub async fn delete_analysis(&self, id: &str) -> Result<SavedAnalysis, OrchestratorError> {
        let session = self.require_session().await?;

        let deleted = self.store.delete_analysis(&session.user_id, id).await?;

        self.cache.invalidate(&CacheKey::analysis(id));
        if let Some(alternate) = &deleted.analysis_id {
            self.cache.invalidate(&CacheKey::analysis(alternate));
        }
        self.cache.invalidate(&CacheKey::session(&deleted.session_id));
        Ok(deleted)
    }

    /// Export an analysis as a pretty-printed JSON document with its
    /// export timestamp.
    pub async fn export_analysis(&self, id: &str) -> Result<String, OrchestratorError> {
        let Some(analysis) = self.get_analysis_by_id(id).await? else {
            return Err(StoreError::NotFound(format!("analysis {id}")).into());
        };

        let export = AnalysisExport {
            exported_at: Utc::now(),
            analysis,
        };
        serde_json::to_string_pretty(&export)
            .map_err(|error| StoreError::Decode(format!("export serialization: {error}")).into())
    }

    /// Whether the user holds at least one active provider key of any
    /// kind.
    ///
    /// Key status lives remotely; when the status lookup fails the answer
    /// is "no keys" with every known provider reported missing, so the
    /// write path stays closed rather than guessing.
    pub async fn check_api_key_requirements(&self) -> KeyRequirements {
        match self.fetch_key_statuses().await {
            Ok(statuses) => {
                let active: Vec<&str> = statuses
                    .iter()
                    .filter(|status| status.active)
                    .map(|status| status.provider.as_str())
                    .collect();

                KeyRequirements {
                    has_required_keys: !active.is_empty(),
                    missing_keys: known_provider_names()
                        .into_iter()
                        .filter(|name| !active.contains(&name.as_str()))
                        .collect(),
                }
            }
            Err(error) => {
                warn!(error = %error, "Key status lookup failed; treating as no active keys");
                KeyRequirements {
                    has_required_keys: false,
                    missing_keys: known_provider_names(),
                }
            }
        }
    }

    /// Providers with an active, validated key, or empty on any failure.
    pub async fn get_available_providers(&self) -> Vec<String> {
        match self.fetch_key_statuses().await {
            Ok(statuses) => statuses
                .into_iter()
                .filter(|status| status.active && status.validated)
                .map(|status| status.provider)
                .collect(),
            Err(error) => {
                warn!(error = %error, "Provider discovery failed; reporting none available");
                Vec::new()
            }
        }
    }

    /// Validate every available provider's key remotely.
    ///
    /// Providers are validated strictly one at a time. A provider whose
    /// validation call fails is recorded as `false`; the loop never aborts
    /// early, so the result always covers every available provider.
    pub async fn validate_all_providers(&self) -> BTreeMap<String, bool> {
        let providers = self.get_available_providers().await;
        let mut results = BTreeMap::new();

        for provider in providers {
            let payload = json!({ "action": "validate", "provider": provider });
            let valid = match self.gateway.invoke(FN_KEY_MANAGER, payload).await {
                Ok(value) => value.get("valid").and_then(Value::as_bool).unwrap_or(false),
                Err(error) => {
                    warn!(provider = %provider, error = %error, "Provider validation failed");
                    false
                }
            };
            results.insert(provider, valid);
        }

        results
    }

    /// Drop every cached analysis row.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Snapshot of the result cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Register a callback for progress transitions this orchestrator
    /// writes for `session_id`.
    pub fn subscribe_to_progress(
        &self,
        session_id: impl Into<String>,
        callback: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> ProgressSubscription {
        self.progress.subscribe(session_id, callback)
    }

    /// Background tasks spawned and not yet drained.
    #[must_use]
    pub fn pending_background_tasks(&self) -> usize {
        self.tasks.pending()
    }

    /// Await all tracked background work and report outcomes.
    pub async fn drain_background_tasks(&self) -> Vec<TaskOutcome> {
        self.tasks.drain().await
    }

    async fn require_session(&self) -> Result<Session, OrchestratorError> {
        self.session
            .current_session()
            .await
            .ok_or(OrchestratorError::AuthenticationRequired)
    }

    async fn fetch_key_statuses(&self) -> Result<Vec<ProviderKeyStatus>, GatewayError> {
        let value = self
            .gateway
            .invoke(FN_KEY_MANAGER, json!({ "action": "get_all_statuses" }))
            .await?;

        let payload: KeyStatusesPayload =
            serde_json::from_value(value).map_err(|error| GatewayError::Decode {
                function: FN_KEY_MANAGER.to_string(),
                message: error.to_string(),
            })?;
        Ok(payload.statuses)
    }

    /// Queue profile enrichment and the legacy aggregation refresh for a
    /// freshly written row.
    ///
    /// Aggregation runs even when enrichment succeeded; existing consumers
    /// still read the legacy aggregate.
    fn schedule_post_save(&self, analysis_id: String) {
        let gateway = Arc::clone(&self.gateway);

        self.tasks.spawn(format!("post-save {analysis_id}"), async move {
            let payload = json!({ "analysisId": analysis_id });
            let mut failures = Vec::new();

            if let Err(error) = gateway
                .invoke(FN_ENRICH_MASTER_PROFILE, payload.clone())
                .await
            {
                warn!(analysis_id = %analysis_id, error = %error, "Profile enrichment failed");
                failures.push(format!("enrichment: {error}"));
            }

            if let Err(error) = gateway.invoke(FN_AGGREGATE_ANALYSIS, payload).await {
                warn!(analysis_id = %analysis_id, error = %error, "Aggregation refresh failed");
                failures.push(format!("aggregation: {error}"));
            }

            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.join("; "))
            }
        });
    }
}

fn known_provider_names() -> Vec<String> {
    ProviderKind::iter().map(|kind| kind.to_string()).collect()
}

#[derive(Debug, Deserialize)]
struct KeyStatusesPayload {
    #[serde(default)]
    statuses: Vec<ProviderKeyStatus>,
}
