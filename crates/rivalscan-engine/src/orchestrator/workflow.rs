//! The gated start-analysis workflow.
//!
//! `start_analysis` runs a fixed sequence: session check, key check,
//! provider resolution, cost and gate preflights, progress and run-log
//! bookkeeping, the rate-limited and breaker-guarded invocation itself,
//! and finally auto-save. Infrastructure checks that fail for transport
//! reasons are waived and reported in the result; explicit denials abort
//! with a typed error. Once the progress row exists, every abort path also
//! records the failure remotely before surfacing it.

use super::AnalysisOrchestrator;
use crate::cache::CacheKey;
use crate::progress::ProgressEvent;
use chrono::Utc;
use rivalscan_remote::ports::{
    FN_COMPETITOR_ANALYSIS, FN_COMPETITOR_ANALYSIS_GATE, FN_UPDATE_ANALYSIS_RUN,
};
use rivalscan_utils::error::OrchestratorError;
use rivalscan_utils::types::{
    AnalysisData, AnalysisDraft, AnalysisRequest, GateDecision, PreflightCheck, PreflightVerdict,
    ProgressStatus, Session, StartedAnalysis,
};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

/// What survived the gated portion of a run.
struct GatedOutcome {
    run_id: Option<String>,
    output: Value,
    execution_time_ms: u64,
    run_log: PreflightVerdict,
}

impl AnalysisOrchestrator {
    /// Run a competitor analysis end to end.
    ///
    /// Hard stops, in order: no session, no active API key, an explicit
    /// budget denial, an explicit gate denial, a progress row that could
    /// not be created, rate limiting, an open breaker, and the analysis
    /// call itself failing. Cost and gate checks whose transport failed
    /// are waived instead and show up in [`StartedAnalysis::preflight`],
    /// as does a run-log row that could not be created.
    ///
    /// Failures after the progress row exists are written back to it and
    /// to the latest run-log row before the error is returned.
    pub async fn start_analysis(
        &self,
        request: AnalysisRequest,
    ) -> Result<StartedAnalysis, OrchestratorError> {
        let started = Instant::now();
        let session_id = request.session_id.clone();
        info!(
            session_id = %session_id,
            competitors = request.competitors.len(),
            "Starting competitor analysis"
        );

        // A rerun under the same session id must not serve stale rows.
        self.cache.invalidate(&CacheKey::session(&session_id));

        let session = self.require_session().await?;

        let requirements = self.check_api_key_requirements().await;
        if !requirements.has_required_keys {
            return Err(OrchestratorError::MissingApiKeys {
                missing: requirements.missing_keys,
            });
        }

        let providers = if request.providers.is_empty() {
            self.get_available_providers().await
        } else {
            request.providers.clone()
        };

        let mut preflight = vec![
            self.cost_preflight(&session, &request.competitors, &providers)
                .await?,
            self.gate_preflight(&providers).await?,
        ];

        let metadata = json!({
            "competitors": request.competitors,
            "providers": providers,
        });
        let created = self
            .store
            .insert_progress(
                &session.user_id,
                &session_id,
                request.competitors.len() as u32,
                metadata,
            )
            .await;
        match created {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(session_id = %session_id, "Backend declined to create a progress row");
                return Err(OrchestratorError::ProgressInitFailed { session_id });
            }
            Err(error) => {
                warn!(session_id = %session_id, error = %error, "Progress row creation failed");
                return Err(OrchestratorError::ProgressInitFailed { session_id });
            }
        }
        self.progress.emit(&ProgressEvent::started(&session_id));

        match self
            .run_gated_analysis(&session, &request, &providers, started)
            .await
        {
            Ok(outcome) => {
                preflight.push(outcome.run_log);
                self.autosave_result(&session_id, &outcome.output).await;

                info!(
                    session_id = %session_id,
                    run_id = outcome.run_id.as_deref().unwrap_or("-"),
                    execution_time_ms = outcome.execution_time_ms,
                    "Competitor analysis finished"
                );
                Ok(StartedAnalysis {
                    session_id,
                    run_id: outcome.run_id,
                    output: outcome.output,
                    execution_time_ms: outcome.execution_time_ms,
                    preflight,
                })
            }
            Err(error) => {
                self.record_run_failure(&session, &session_id, &error, started)
                    .await;
                Err(error)
            }
        }
    }

    /// Run log, invocation, and run-log completion.
    async fn run_gated_analysis(
        &self,
        session: &Session,
        request: &AnalysisRequest,
        providers: &[String],
        started: Instant,
    ) -> Result<GatedOutcome, OrchestratorError> {
        let (run_id, run_log) = self.create_run_log(session, request, providers).await;

        let output = self.invoke_analysis(request, providers).await?;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        if let Some(run_id) = &run_id {
            let payload = json!({
                "action": "complete",
                "runId": run_id,
                "output": output,
                "executionTimeMs": execution_time_ms,
            });
            if let Err(error) = self.gateway.invoke(FN_UPDATE_ANALYSIS_RUN, payload).await {
                warn!(run_id = %run_id, error = %error, "Could not mark the run log completed");
            }
        }

        Ok(GatedOutcome {
            run_id,
            output,
            execution_time_ms,
            run_log,
        })
    }

    /// Create the run-log row. Creation failures are waived, not fatal;
    /// the run proceeds without a run id.
    async fn create_run_log(
        &self,
        session: &Session,
        request: &AnalysisRequest,
        providers: &[String],
    ) -> (Option<String>, PreflightVerdict) {
        let input = json!({
            "competitors": request.competitors,
            "providers": providers,
            "models": request.models,
        });

        let created = self
            .store
            .insert_run(&session.user_id, &self.run_type, &request.session_id, input)
            .await;
        match created {
            Ok(Some(run_id)) => (
                Some(run_id),
                PreflightVerdict::Cleared {
                    check: PreflightCheck::RunLog,
                },
            ),
            Ok(None) => {
                warn!(session_id = %request.session_id, "Run log row was not created");
                (
                    None,
                    PreflightVerdict::Waived {
                        check: PreflightCheck::RunLog,
                        reason: "run log row was not created".to_string(),
                    },
                )
            }
            Err(error) => {
                warn!(session_id = %request.session_id, error = %error, "Run log creation failed");
                (
                    None,
                    PreflightVerdict::Waived {
                        check: PreflightCheck::RunLog,
                        reason: error.to_string(),
                    },
                )
            }
        }
    }

    /// The guarded call to the analysis edge function.
    ///
    /// Order matters: the rate limiter is consulted before the breaker so
    /// a saturated window never burns breaker probes. The retry schedule
    /// covers every gateway error; a payload-level `error` field only
    /// fails the run after retries settle on a response, and counts as a
    /// failure for the breaker like any other.
    async fn invoke_analysis(
        &self,
        request: &AnalysisRequest,
        providers: &[String],
    ) -> Result<Value, OrchestratorError> {
        let limiter_key = format!("edge:{FN_COMPETITOR_ANALYSIS}");
        self.limiter
            .try_acquire(&limiter_key)
            .map_err(|rejection| OrchestratorError::RateLimited {
                key: rejection.key,
                retry_after: rejection.retry_after,
            })?;

        self.breaker
            .preflight()
            .map_err(|rejection| OrchestratorError::CircuitOpen {
                retry_after: rejection.retry_after,
            })?;

        let payload = json!({
            "sessionId": request.session_id,
            "competitors": request.competitors,
            "action": "start",
            "providersSelected": providers,
            "models": request.models,
        });

        let result = self
            .invoke_retry
            .run(FN_COMPETITOR_ANALYSIS, || {
                self.gateway.invoke(FN_COMPETITOR_ANALYSIS, payload.clone())
            })
            .await;

        match result {
            Ok(output) => {
                if let Some(message) = payload_error(&output) {
                    self.breaker.record(false);
                    return Err(OrchestratorError::AnalysisFailed { message });
                }
                self.breaker.record(true);
                Ok(output)
            }
            Err(error) => {
                self.breaker.record(false);
                Err(OrchestratorError::AnalysisFailed {
                    message: error.to_string(),
                })
            }
        }
    }

    /// Best-effort persistence of a failed run: the progress row, the
    /// subscribers, and the latest run-log row all learn about it.
    async fn record_run_failure(
        &self,
        session: &Session,
        session_id: &str,
        error: &OrchestratorError,
        started: Instant,
    ) {
        let message = error.to_string();

        if let Err(update_error) = self
            .store
            .update_progress(session_id, ProgressStatus::Failed, Some(&message))
            .await
        {
            warn!(
                session_id = %session_id,
                error = %update_error,
                "Could not mark progress failed"
            );
        }
        self.progress
            .emit(&ProgressEvent::failed(session_id, &message));

        match self
            .store
            .latest_run_for_session(&session.user_id, session_id)
            .await
        {
            Ok(Some(run)) => {
                let payload = json!({
                    "action": "fail",
                    "runId": run.id,
                    "errorMessage": message,
                    "executionTimeMs": started.elapsed().as_millis() as u64,
                });
                if let Err(invoke_error) =
                    self.gateway.invoke(FN_UPDATE_ANALYSIS_RUN, payload).await
                {
                    warn!(
                        run_id = %run.id,
                        error = %invoke_error,
                        "Could not mark the run log failed"
                    );
                }
            }
            Ok(None) => {}
            Err(lookup_error) => {
                warn!(session_id = %session_id, error = %lookup_error, "Run log lookup failed");
            }
        }
    }

    /// Persist a successful result under a generated name. Failures are
    /// logged and swallowed; the caller already holds the output.
    async fn autosave_result(&self, session_id: &str, output: &Value) {
        let data = match AnalysisData::from_value(output.clone()) {
            Ok(data) => data,
            Err(error) => {
                warn!(
                    session_id = %session_id,
                    error = %error,
                    "Analysis output is not an object; skipping auto-save"
                );
                return;
            }
        };

        let draft = AnalysisDraft::new(data)
            .with_name(format!(
                "Competitor Analysis {}",
                Utc::now().format("%Y-%m-%d %H:%M")
            ))
            .with_status("completed");

        if let Err(error) = self.save_analysis(session_id, draft).await {
            warn!(
                session_id = %session_id,
                error = %error,
                "Auto-save of the analysis result failed"
            );
        }
    }

    /// Budget check. An explicit denial aborts; an unreachable check is
    /// waived.
    async fn cost_preflight(
        &self,
        session: &Session,
        competitors: &[String],
        providers: &[String],
    ) -> Result<PreflightVerdict, OrchestratorError> {
        let projected =
            competitors.len() as f64 * providers.len() as f64 * self.cost_per_provider_competitor;

        match self.store.check_cost_allowed(&session.user_id, projected).await {
            Ok(decision) if decision.allowed => Ok(PreflightVerdict::Cleared {
                check: PreflightCheck::CostEstimate,
            }),
            Ok(decision) => Err(OrchestratorError::BudgetExceeded {
                projected,
                remaining: decision.remaining.unwrap_or(0.0),
                monthly_limit: decision.monthly_limit.unwrap_or(0.0),
            }),
            Err(error) => {
                warn!(error = %error, "Cost check unavailable; waiving it");
                Ok(PreflightVerdict::Waived {
                    check: PreflightCheck::CostEstimate,
                    reason: error.to_string(),
                })
            }
        }
    }

    /// Feature gate. Only a well-formed `can_proceed: false` aborts;
    /// unreachable or unintelligible gates are waived.
    async fn gate_preflight(
        &self,
        providers: &[String],
    ) -> Result<PreflightVerdict, OrchestratorError> {
        let payload = json!({ "action": "check", "providers": providers });

        match self.gateway.invoke(FN_COMPETITOR_ANALYSIS_GATE, payload).await {
            Ok(value) => match serde_json::from_value::<GateDecision>(value) {
                Ok(decision) if decision.can_proceed => Ok(PreflightVerdict::Cleared {
                    check: PreflightCheck::FeatureGate,
                }),
                Ok(decision) => {
                    let reasons = if decision.reasons.is_empty() {
                        vec!["no reason reported".to_string()]
                    } else {
                        decision.reasons
                    };
                    Err(OrchestratorError::GateDenied { reasons })
                }
                Err(error) => {
                    warn!(error = %error, "Gate response was unintelligible; waiving the gate");
                    Ok(PreflightVerdict::Waived {
                        check: PreflightCheck::FeatureGate,
                        reason: format!("unintelligible gate response: {error}"),
                    })
                }
            },
            Err(error) => {
                warn!(error = %error, "Gate unreachable; waiving it");
                Ok(PreflightVerdict::Waived {
                    check: PreflightCheck::FeatureGate,
                    reason: error.to_string(),
                })
            }
        }
    }
}

fn payload_error(output: &Value) -> Option<String> {
    output
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorBuilder;
    use rivalscan_remote::ports::{
        AnalysisStore, FunctionGateway, SessionProvider, FN_AGGREGATE_ANALYSIS,
        FN_ENRICH_MASTER_PROFILE, FN_KEY_MANAGER,
    };
    use rivalscan_remote::test_support::{
        FailureMode, InMemoryStore, ScriptedGateway, StaticSessionProvider, StoreOp,
    };
    use rivalscan_resilience::{CircuitBreaker, RateLimiter, RetryPolicy};
    use rivalscan_utils::types::CostDecision;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        gateway: Arc<ScriptedGateway>,
        orchestrator: AnalysisOrchestrator,
    }

    /// Signed-in harness with a backend in a good mood: one usable key,
    /// an open gate, an analysis result, and quiet post-save functions.
    fn happy_harness() -> Harness {
        let h = bare_harness(StaticSessionProvider::signed_in("user-1", "token"));
        h.gateway.set_default(
            FN_KEY_MANAGER,
            json!({ "statuses": [{ "provider": "openai", "active": true, "validated": true }] }),
        );
        h.gateway
            .set_default(FN_COMPETITOR_ANALYSIS_GATE, json!({ "can_proceed": true }));
        h.gateway.set_default(
            FN_COMPETITOR_ANALYSIS,
            json!({
                "summary": "Acme leads on pricing",
                "competitors": ["Acme Corp", "Globex"],
            }),
        );
        h.gateway.set_default(FN_UPDATE_ANALYSIS_RUN, json!({}));
        h.gateway.set_default(FN_ENRICH_MASTER_PROFILE, json!({}));
        h.gateway.set_default(FN_AGGREGATE_ANALYSIS, json!({}));
        h
    }

    fn bare_harness(session: StaticSessionProvider) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new());

        let orchestrator = OrchestratorBuilder::new(
            Arc::new(session) as Arc<dyn SessionProvider>,
            Arc::clone(&store) as Arc<dyn AnalysisStore>,
            Arc::clone(&gateway) as Arc<dyn FunctionGateway>,
        )
        .invoke_retry(fast_retry())
        .read_retry(fast_retry())
        .build();

        Harness {
            store,
            gateway,
            orchestrator,
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(
            "sess-1",
            vec!["Acme Corp".to_string(), "Globex".to_string()],
        )
        .with_providers(vec!["openai".to_string()])
    }

    #[tokio::test]
    async fn run_completes_and_records_everything() {
        let h = happy_harness();

        let started = h.orchestrator.start_analysis(request()).await.unwrap();
        h.orchestrator.drain_background_tasks().await;

        assert_eq!(started.session_id, "sess-1");
        assert_eq!(started.run_id.as_deref(), Some("run-1"));
        assert_eq!(started.output["summary"], "Acme leads on pricing");
        assert_eq!(started.preflight.len(), 3);
        assert!(started.preflight.iter().all(|v| !v.is_waived()));

        // Progress and run-log rows exist for the session.
        let progress = h.store.progress_rows();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].session_id, "sess-1");
        let runs = h.store.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_type, "competitor_analysis");

        // The invocation carried the selected providers and the action.
        let payload = h.gateway.last_payload(FN_COMPETITOR_ANALYSIS).unwrap();
        assert_eq!(payload["action"], "start");
        assert_eq!(payload["sessionId"], "sess-1");
        assert_eq!(payload["providersSelected"], json!(["openai"]));

        // The run log was completed with the output attached.
        let completion = h.gateway.last_payload(FN_UPDATE_ANALYSIS_RUN).unwrap();
        assert_eq!(completion["action"], "complete");
        assert_eq!(completion["runId"], "run-1");
        assert_eq!(completion["output"]["summary"], "Acme leads on pricing");

        // The result was auto-saved under a generated name.
        let saved = h.store.analyses();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].name.starts_with("Competitor Analysis "));
        assert_eq!(saved[0].status, "completed");
    }

    #[tokio::test]
    async fn run_consumes_one_rate_limit_slot() {
        let h = happy_harness();
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));

        let store = Arc::clone(&h.store);
        let gateway = Arc::clone(&h.gateway);
        let orchestrator = OrchestratorBuilder::new(
            Arc::new(StaticSessionProvider::signed_in("user-1", "token")),
            store as Arc<dyn AnalysisStore>,
            gateway as Arc<dyn FunctionGateway>,
        )
        .invoke_retry(fast_retry())
        .read_retry(fast_retry())
        .limiter(Arc::clone(&limiter))
        .build();

        orchestrator.start_analysis(request()).await.unwrap();
        orchestrator.drain_background_tasks().await;

        assert_eq!(limiter.in_window("edge:competitor-analysis"), 1);
    }

    #[tokio::test]
    async fn run_requires_a_session() {
        let h = bare_harness(StaticSessionProvider::signed_out());

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        assert!(matches!(error, OrchestratorError::AuthenticationRequired));
        assert_eq!(h.store.calls(StoreOp::InsertProgress), 0);
        assert_eq!(h.store.calls(StoreOp::InsertRun), 0);
        assert!(h.gateway.invocations().is_empty());
    }

    #[tokio::test]
    async fn run_requires_an_active_key() {
        let h = bare_harness(StaticSessionProvider::signed_in("user-1", "token"));
        h.gateway.set_default(
            FN_KEY_MANAGER,
            json!({ "statuses": [{ "provider": "openai", "active": false, "validated": false }] }),
        );

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        match error {
            OrchestratorError::MissingApiKeys { missing } => {
                assert!(missing.contains(&"openai".to_string()));
            }
            other => panic!("expected MissingApiKeys, got {other:?}"),
        }
        assert_eq!(h.store.calls(StoreOp::CheckCost), 0);
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS_GATE), 0);
    }

    #[tokio::test]
    async fn unreachable_cost_check_is_waived_and_visible() {
        let h = happy_harness();
        h.store.fail_with(StoreOp::CheckCost, FailureMode::Transport);

        let started = h.orchestrator.start_analysis(request()).await.unwrap();
        h.orchestrator.drain_background_tasks().await;

        assert!(matches!(
            &started.preflight[0],
            PreflightVerdict::Waived {
                check: PreflightCheck::CostEstimate,
                ..
            }
        ));
        // The gate still ran after the waived cost check.
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS_GATE), 1);
    }

    #[tokio::test]
    async fn explicit_budget_denial_stops_the_run() {
        let h = happy_harness();
        h.store.set_cost_decision(CostDecision {
            allowed: false,
            remaining: Some(0.01),
            monthly_limit: Some(10.0),
        });

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        match error {
            OrchestratorError::BudgetExceeded {
                projected,
                remaining,
                monthly_limit,
            } => {
                // 2 competitors x 1 provider x $0.02.
                assert!((projected - 0.04).abs() < 1e-9);
                assert!((remaining - 0.01).abs() < 1e-9);
                assert!((monthly_limit - 10.0).abs() < 1e-9);
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS_GATE), 0);
        assert_eq!(h.store.calls(StoreOp::InsertProgress), 0);
    }

    #[tokio::test]
    async fn explicit_gate_denial_stops_the_run() {
        let h = happy_harness();
        h.gateway.set_default(
            FN_COMPETITOR_ANALYSIS_GATE,
            json!({ "can_proceed": false, "reasons": ["trial ended"] }),
        );

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        match error {
            OrchestratorError::GateDenied { reasons } => {
                assert_eq!(reasons, vec!["trial ended"]);
            }
            other => panic!("expected GateDenied, got {other:?}"),
        }
        assert_eq!(h.store.calls(StoreOp::InsertProgress), 0);
    }

    #[tokio::test]
    async fn gate_denial_without_reasons_gets_a_placeholder() {
        let h = happy_harness();
        h.gateway
            .set_default(FN_COMPETITOR_ANALYSIS_GATE, json!({ "can_proceed": false }));

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        match error {
            OrchestratorError::GateDenied { reasons } => {
                assert_eq!(reasons, vec!["no reason reported"]);
            }
            other => panic!("expected GateDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_gate_is_waived_and_the_run_proceeds() {
        let h = happy_harness();
        // The queued error answers before the happy default does.
        h.gateway
            .enqueue_transport(FN_COMPETITOR_ANALYSIS_GATE, "gate timeout");

        let started = h.orchestrator.start_analysis(request()).await.unwrap();
        h.orchestrator.drain_background_tasks().await;

        assert!(matches!(
            &started.preflight[1],
            PreflightVerdict::Waived {
                check: PreflightCheck::FeatureGate,
                ..
            }
        ));
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS), 1);
    }

    #[tokio::test]
    async fn unintelligible_gate_response_is_waived() {
        let h = happy_harness();
        h.gateway
            .set_default(FN_COMPETITOR_ANALYSIS_GATE, json!({ "unexpected": "shape" }));

        let started = h.orchestrator.start_analysis(request()).await.unwrap();
        h.orchestrator.drain_background_tasks().await;

        match &started.preflight[1] {
            PreflightVerdict::Waived { reason, .. } => {
                assert!(reason.contains("unintelligible"), "got: {reason}");
            }
            other => panic!("expected a waived gate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn declined_progress_row_stops_the_run() {
        let h = happy_harness();
        h.store.fail_with(StoreOp::InsertProgress, FailureMode::NullId);

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        assert!(matches!(
            error,
            OrchestratorError::ProgressInitFailed { ref session_id } if session_id == "sess-1"
        ));
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS), 0);
    }

    #[tokio::test]
    async fn failed_progress_insert_stops_the_run() {
        let h = happy_harness();
        h.store
            .fail_with(StoreOp::InsertProgress, FailureMode::Transport);

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        assert!(matches!(error, OrchestratorError::ProgressInitFailed { .. }));
        assert_eq!(h.store.calls(StoreOp::InsertRun), 0);
    }

    #[tokio::test]
    async fn missing_run_log_is_waived_and_never_completed() {
        let h = happy_harness();
        h.store.fail_with(StoreOp::InsertRun, FailureMode::NullId);

        let started = h.orchestrator.start_analysis(request()).await.unwrap();
        h.orchestrator.drain_background_tasks().await;

        assert_eq!(started.run_id, None);
        assert!(matches!(
            &started.preflight[2],
            PreflightVerdict::Waived {
                check: PreflightCheck::RunLog,
                ..
            }
        ));
        assert_eq!(h.gateway.calls(FN_UPDATE_ANALYSIS_RUN), 0);
    }

    #[tokio::test]
    async fn invocation_failure_is_retried_then_recorded() {
        let h = happy_harness();
        // Three queued errors cover the initial attempt and both retries.
        for _ in 0..3 {
            h.gateway
                .enqueue_transport(FN_COMPETITOR_ANALYSIS, "edge timeout");
        }

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        assert!(matches!(error, OrchestratorError::AnalysisFailed { .. }));
        // Initial attempt plus two retries.
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS), 3);

        // The progress row carries the failure.
        let progress = h.store.progress_rows();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].status, ProgressStatus::Failed);
        assert!(!progress[0].error_message.as_deref().unwrap().is_empty());

        // The run log was failed with the message attached.
        let failure = h.gateway.last_payload(FN_UPDATE_ANALYSIS_RUN).unwrap();
        assert_eq!(failure["action"], "fail");
        assert_eq!(failure["runId"], "run-1");
        assert!(!failure["errorMessage"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_payload_fails_without_retrying() {
        let h = happy_harness();
        h.gateway.set_default(
            FN_COMPETITOR_ANALYSIS,
            json!({ "error": "model quota exhausted" }),
        );

        let error = h.orchestrator.start_analysis(request()).await.unwrap_err();

        match error {
            OrchestratorError::AnalysisFailed { message } => {
                assert_eq!(message, "model quota exhausted");
            }
            other => panic!("expected AnalysisFailed, got {other:?}"),
        }
        // The response decoded fine; nothing to retry.
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS), 1);
    }

    #[tokio::test]
    async fn saturated_rate_limit_fails_fast_and_is_recorded() {
        let h = happy_harness();
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        limiter.try_acquire("edge:competitor-analysis").unwrap();

        let orchestrator = OrchestratorBuilder::new(
            Arc::new(StaticSessionProvider::signed_in("user-1", "token")),
            Arc::clone(&h.store) as Arc<dyn AnalysisStore>,
            Arc::clone(&h.gateway) as Arc<dyn FunctionGateway>,
        )
        .invoke_retry(fast_retry())
        .read_retry(fast_retry())
        .limiter(limiter)
        .build();

        let error = orchestrator.start_analysis(request()).await.unwrap_err();

        match error {
            OrchestratorError::RateLimited { key, .. } => {
                assert_eq!(key, "edge:competitor-analysis");
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS), 0);
        // Bookkeeping still happened: the progress row exists and is failed.
        let progress = h.store.progress_rows();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].status, ProgressStatus::Failed);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast() {
        let h = happy_harness();
        let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(60)));
        breaker.record(false);
        assert!(breaker.is_open());

        let orchestrator = OrchestratorBuilder::new(
            Arc::new(StaticSessionProvider::signed_in("user-1", "token")),
            Arc::clone(&h.store) as Arc<dyn AnalysisStore>,
            Arc::clone(&h.gateway) as Arc<dyn FunctionGateway>,
        )
        .invoke_retry(fast_retry())
        .read_retry(fast_retry())
        .breaker(breaker)
        .build();

        let error = orchestrator.start_analysis(request()).await.unwrap_err();

        assert!(matches!(error, OrchestratorError::CircuitOpen { .. }));
        assert_eq!(h.gateway.calls(FN_COMPETITOR_ANALYSIS), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_start_and_failure() {
        let h = happy_harness();
        h.gateway
            .set_default(FN_COMPETITOR_ANALYSIS, json!({ "error": "provider down" }));

        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _subscription = h
            .orchestrator
            .subscribe_to_progress("sess-1", move |event| {
                sink.lock().unwrap().push(event.clone());
            });

        let _ = h.orchestrator.start_analysis(request()).await;

        let seen = events.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].status, ProgressStatus::Pending);
        assert_eq!(seen[1].status, ProgressStatus::Failed);
        assert!(seen[1].error_message.as_deref().unwrap().contains("provider down"));
    }

    #[tokio::test]
    async fn auto_save_failures_do_not_fail_the_run() {
        let h = happy_harness();
        h.store
            .fail_with(StoreOp::FindBySession, FailureMode::Transport);

        let started = h.orchestrator.start_analysis(request()).await.unwrap();

        assert_eq!(started.output["summary"], "Acme leads on pricing");
        assert!(h.store.analyses().is_empty());
    }

    #[tokio::test]
    async fn non_object_output_skips_auto_save() {
        let h = happy_harness();
        h.gateway
            .set_default(FN_COMPETITOR_ANALYSIS, json!("just a string"));

        let started = h.orchestrator.start_analysis(request()).await.unwrap();

        assert_eq!(started.output, json!("just a string"));
        assert!(h.store.analyses().is_empty());
    }

    #[tokio::test]
    async fn empty_provider_selection_discovers_available_providers() {
        let h = happy_harness();
        let no_providers = AnalysisRequest::new(
            "sess-1",
            vec!["Acme Corp".to_string(), "Globex".to_string()],
        );

        h.orchestrator.start_analysis(no_providers).await.unwrap();
        h.orchestrator.drain_background_tasks().await;

        let payload = h.gateway.last_payload(FN_COMPETITOR_ANALYSIS).unwrap();
        assert_eq!(payload["providersSelected"], json!(["openai"]));
    }
}
