//! In-memory doubles for every port, used across the workspace's tests.
//!
//! `InMemoryStore` keeps real rows and supports scripting failures per
//! operation, so tests can exercise retry, fail-open, and fail-closed paths
//! without a network. `ScriptedGateway` answers edge-function invocations
//! from per-function queues, handlers, or defaults, and records every
//! invocation for assertions. `StaticSessionProvider` toggles between a
//! signed-in and signed-out caller.

use crate::ports::{AnalysisStore, FunctionGateway, SessionProvider};
use async_trait::async_trait;
use chrono::Utc;
use rivalscan_utils::error::{GatewayError, StoreError};
use rivalscan_utils::types::{
    AnalysisData, AnalysisDraft, AnalysisProgress, AnalysisRun, AnalysisUpdate, CostDecision,
    ProgressStatus, RunStatus, SavedAnalysis, Session,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Which store operation a scripted failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListAnalyses,
    FindBySession,
    InsertAnalysis,
    UpdateAnalysis,
    DeleteAnalysis,
    InsertProgress,
    UpdateProgress,
    InsertRun,
    LatestRun,
    CheckCost,
    FetchCombined,
}

/// What a scripted store failure should look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Transport,
    PermissionDenied,
    NotFound,
    /// Only meaningful for `InsertProgress`/`InsertRun`: the call succeeds
    /// but the backend returns no id.
    NullId,
}

#[derive(Debug, Clone, Copy)]
struct ScriptedFailure {
    mode: FailureMode,
    /// `None` keeps the failure active for every call.
    remaining: Option<u32>,
}

#[derive(Default)]
struct StoreState {
    analyses: Vec<SavedAnalysis>,
    progress: Vec<AnalysisProgress>,
    runs: Vec<AnalysisRun>,
    combined: HashMap<String, Value>,
    cost_decision: Option<CostDecision>,
    failures: HashMap<StoreOp, ScriptedFailure>,
    calls: HashMap<StoreOp, u32>,
    next_id: u64,
}

/// In-memory [`AnalysisStore`] with scriptable failures and call counters.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every future call to `op` with `mode`.
    pub fn fail_with(&self, op: StoreOp, mode: FailureMode) {
        self.state().failures.insert(
            op,
            ScriptedFailure {
                mode,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` calls to `op` with `mode`, then recover.
    pub fn fail_times(&self, op: StoreOp, mode: FailureMode, times: u32) {
        self.state().failures.insert(
            op,
            ScriptedFailure {
                mode,
                remaining: Some(times),
            },
        );
    }

    /// Drop all scripted failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// How many times `op` has been called.
    #[must_use]
    pub fn calls(&self, op: StoreOp) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Seed a saved-analysis row.
    pub fn push_analysis(&self, analysis: SavedAnalysis) {
        self.state().analyses.push(analysis);
    }

    /// Set the decision every cost check returns.
    pub fn set_cost_decision(&self, decision: CostDecision) {
        self.state().cost_decision = Some(decision);
    }

    /// Seed a combined aggregation payload for an analysis id.
    pub fn set_combined(&self, analysis_id: impl Into<String>, combined: Value) {
        self.state().combined.insert(analysis_id.into(), combined);
    }

    /// Snapshot of the saved-analysis rows.
    #[must_use]
    pub fn analyses(&self) -> Vec<SavedAnalysis> {
        self.state().analyses.clone()
    }

    /// Snapshot of the progress rows.
    #[must_use]
    pub fn progress_rows(&self) -> Vec<AnalysisProgress> {
        self.state().progress.clone()
    }

    /// Snapshot of the run-log rows.
    #[must_use]
    pub fn runs(&self) -> Vec<AnalysisRun> {
        self.state().runs.clone()
    }

    /// Count the call and pop an active scripted failure, if any.
    fn begin(state: &mut StoreState, op: StoreOp) -> Option<FailureMode> {
        *state.calls.entry(op).or_insert(0) += 1;

        let (mode, exhausted) = match state.failures.get_mut(&op) {
            Some(scripted) => match scripted.remaining.as_mut() {
                Some(n) => {
                    *n -= 1;
                    (Some(scripted.mode), *n == 0)
                }
                None => (Some(scripted.mode), false),
            },
            None => (None, false),
        };
        if exhausted {
            state.failures.remove(&op);
        }
        mode
    }

    fn failure_error(op: StoreOp, mode: FailureMode) -> StoreError {
        match mode {
            FailureMode::Transport | FailureMode::NullId => {
                StoreError::Transport(format!("scripted transport failure for {op:?}"))
            }
            FailureMode::PermissionDenied => {
                StoreError::PermissionDenied(format!("scripted permission denial for {op:?}"))
            }
            FailureMode::NotFound => StoreError::NotFound(format!("scripted not-found for {op:?}")),
        }
    }

    fn next_id(state: &mut StoreState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn list_analyses(&self, user_id: &str) -> Result<Vec<SavedAnalysis>, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::ListAnalyses) {
            return Err(Self::failure_error(StoreOp::ListAnalyses, mode));
        }
        Ok(state
            .analyses
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_analysis_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<SavedAnalysis>, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::FindBySession) {
            return Err(Self::failure_error(StoreOp::FindBySession, mode));
        }
        Ok(state
            .analyses
            .iter()
            .find(|row| row.user_id == user_id && row.session_id == session_id)
            .cloned())
    }

    async fn insert_analysis(
        &self,
        user_id: &str,
        session_id: &str,
        draft: &AnalysisDraft,
    ) -> Result<SavedAnalysis, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::InsertAnalysis) {
            return Err(Self::failure_error(StoreOp::InsertAnalysis, mode));
        }

        let row = SavedAnalysis {
            id: Self::next_id(&mut state, "analysis"),
            analysis_id: None,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            name: draft
                .name
                .clone()
                .unwrap_or_else(|| "Competitor Analysis".to_string()),
            description: draft.description.clone(),
            analysis_data: draft.analysis_data.clone(),
            status: draft.status.clone().unwrap_or_else(|| "completed".to_string()),
            created_at: Some(Utc::now()),
            completed_at: None,
        };
        state.analyses.push(row.clone());
        Ok(row)
    }

    async fn update_analysis(
        &self,
        user_id: &str,
        analysis_id: &str,
        update: &AnalysisUpdate,
    ) -> Result<SavedAnalysis, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::UpdateAnalysis) {
            return Err(Self::failure_error(StoreOp::UpdateAnalysis, mode));
        }
        if update.is_empty() {
            return Err(StoreError::InvalidRequest(
                "no fields set in analysis update".to_string(),
            ));
        }

        let row = state
            .analyses
            .iter_mut()
            .find(|row| row.user_id == user_id && row.id == analysis_id)
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))?;

        if let Some(name) = &update.name {
            row.name = name.clone();
        }
        if let Some(description) = &update.description {
            row.description = Some(description.clone());
        }
        if let Some(analysis_data) = &update.analysis_data {
            row.analysis_data = analysis_data.clone();
        }
        if let Some(status) = &update.status {
            row.status = status.clone();
        }
        Ok(row.clone())
    }

    async fn delete_analysis(
        &self,
        user_id: &str,
        analysis_id: &str,
    ) -> Result<SavedAnalysis, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::DeleteAnalysis) {
            return Err(Self::failure_error(StoreOp::DeleteAnalysis, mode));
        }

        let position = state
            .analyses
            .iter()
            .position(|row| row.user_id == user_id && row.id == analysis_id)
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))?;
        Ok(state.analyses.remove(position))
    }

    async fn insert_progress(
        &self,
        user_id: &str,
        session_id: &str,
        total_competitors: u32,
        metadata: Value,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.state();
        match Self::begin(&mut state, StoreOp::InsertProgress) {
            Some(FailureMode::NullId) => return Ok(None),
            Some(mode) => return Err(Self::failure_error(StoreOp::InsertProgress, mode)),
            None => {}
        }

        let id = Self::next_id(&mut state, "progress");
        state.progress.push(AnalysisProgress {
            id: id.clone(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            total_competitors,
            status: ProgressStatus::Pending,
            error_message: None,
            metadata,
        });
        Ok(Some(id))
    }

    async fn update_progress(
        &self,
        session_id: &str,
        status: ProgressStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::UpdateProgress) {
            return Err(Self::failure_error(StoreOp::UpdateProgress, mode));
        }

        if let Some(row) = state
            .progress
            .iter_mut()
            .find(|row| row.session_id == session_id)
        {
            row.status = status;
            row.error_message = error_message.map(str::to_string);
        }
        Ok(())
    }

    async fn insert_run(
        &self,
        user_id: &str,
        run_type: &str,
        session_id: &str,
        input: Value,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.state();
        match Self::begin(&mut state, StoreOp::InsertRun) {
            Some(FailureMode::NullId) => return Ok(None),
            Some(mode) => return Err(Self::failure_error(StoreOp::InsertRun, mode)),
            None => {}
        }

        let id = Self::next_id(&mut state, "run");
        state.runs.push(AnalysisRun {
            id: id.clone(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            run_type: run_type.to_string(),
            input_payload: input,
            output_payload: None,
            status: RunStatus::Running,
            started_at: Utc::now(),
            execution_time_ms: None,
            error_message: None,
        });
        Ok(Some(id))
    }

    async fn latest_run_for_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<AnalysisRun>, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::LatestRun) {
            return Err(Self::failure_error(StoreOp::LatestRun, mode));
        }
        Ok(state
            .runs
            .iter()
            .rev()
            .find(|run| run.user_id == user_id && run.session_id == session_id)
            .cloned())
    }

    async fn check_cost_allowed(
        &self,
        user_id: &str,
        _projected_cost: f64,
    ) -> Result<CostDecision, StoreError> {
        let _ = user_id;
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::CheckCost) {
            return Err(Self::failure_error(StoreOp::CheckCost, mode));
        }
        Ok(state.cost_decision.clone().unwrap_or(CostDecision {
            allowed: true,
            remaining: None,
            monthly_limit: None,
        }))
    }

    async fn fetch_combined_aggregate(
        &self,
        _user_id: &str,
        analysis_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let mut state = self.state();
        if let Some(mode) = Self::begin(&mut state, StoreOp::FetchCombined) {
            return Err(Self::failure_error(StoreOp::FetchCombined, mode));
        }
        Ok(state.combined.get(analysis_id).cloned())
    }
}

/// Build a saved-analysis row with sensible defaults for tests.
#[must_use]
pub fn analysis_row(id: &str, session_id: &str, user_id: &str) -> SavedAnalysis {
    SavedAnalysis {
        id: id.to_string(),
        analysis_id: None,
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        name: format!("Analysis {id}"),
        description: None,
        analysis_data: AnalysisData::default(),
        status: "completed".to_string(),
        created_at: Some(Utc::now()),
        completed_at: None,
    }
}

type GatewayHandler = Box<dyn Fn(&Value) -> Result<Value, GatewayError> + Send + Sync>;

#[derive(Default)]
struct GatewayState {
    queues: HashMap<String, VecDeque<Result<Value, GatewayError>>>,
    handlers: HashMap<String, GatewayHandler>,
    defaults: HashMap<String, Value>,
    invocations: Vec<(String, Value)>,
}

/// [`FunctionGateway`] answering from scripted queues, handlers, or
/// defaults, in that order. Unscripted functions fail with a transport
/// error, which is also the right default for fail-closed paths.
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<GatewayState>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a successful response for the next call to `function`.
    pub fn enqueue_ok(&self, function: &str, value: Value) {
        self.state()
            .queues
            .entry(function.to_string())
            .or_default()
            .push_back(Ok(value));
    }

    /// Queue a transport failure for the next call to `function`.
    pub fn enqueue_transport(&self, function: &str, message: &str) {
        self.state()
            .queues
            .entry(function.to_string())
            .or_default()
            .push_back(Err(GatewayError::Transport {
                function: function.to_string(),
                message: message.to_string(),
            }));
    }

    /// Queue a remote-reported error for the next call to `function`.
    pub fn enqueue_remote(&self, function: &str, message: &str) {
        self.state()
            .queues
            .entry(function.to_string())
            .or_default()
            .push_back(Err(GatewayError::Remote {
                function: function.to_string(),
                message: message.to_string(),
            }));
    }

    /// Respond to every otherwise-unscripted call to `function` with `value`.
    pub fn set_default(&self, function: &str, value: Value) {
        self.state().defaults.insert(function.to_string(), value);
    }

    /// Respond to otherwise-unscripted calls by running `handler` on the
    /// payload. Queued responses still take precedence.
    pub fn set_handler(
        &self,
        function: &str,
        handler: impl Fn(&Value) -> Result<Value, GatewayError> + Send + Sync + 'static,
    ) {
        self.state()
            .handlers
            .insert(function.to_string(), Box::new(handler));
    }

    /// Every invocation so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.state().invocations.clone()
    }

    /// How many times `function` has been invoked.
    #[must_use]
    pub fn calls(&self, function: &str) -> usize {
        self.state()
            .invocations
            .iter()
            .filter(|(name, _)| name == function)
            .count()
    }

    /// The most recent payload sent to `function`.
    #[must_use]
    pub fn last_payload(&self, function: &str) -> Option<Value> {
        self.state()
            .invocations
            .iter()
            .rev()
            .find(|(name, _)| name == function)
            .map(|(_, payload)| payload.clone())
    }
}

#[async_trait]
impl FunctionGateway for ScriptedGateway {
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, GatewayError> {
        let mut state = self.state();
        state
            .invocations
            .push((function.to_string(), payload.clone()));

        if let Some(queue) = state.queues.get_mut(function) {
            if let Some(scripted) = queue.pop_front() {
                return scripted;
            }
        }
        if let Some(handler) = state.handlers.get(function) {
            return handler(&payload);
        }
        if let Some(value) = state.defaults.get(function) {
            return Ok(value.clone());
        }
        Err(GatewayError::Transport {
            function: function.to_string(),
            message: "no scripted response".to_string(),
        })
    }
}

/// [`SessionProvider`] with a settable session.
pub struct StaticSessionProvider {
    session: Mutex<Option<Session>>,
}

impl StaticSessionProvider {
    /// Provider for a signed-in caller.
    #[must_use]
    pub fn signed_in(user_id: &str, access_token: &str) -> Self {
        Self {
            session: Mutex::new(Some(Session::new(user_id, access_token))),
        }
    }

    /// Provider with nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }

    /// Replace the current session mid-test.
    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = session;
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
