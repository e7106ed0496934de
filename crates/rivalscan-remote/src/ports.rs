//! Port traits the orchestration engine is constructed against.
//!
//! All three are object-safe and injected explicitly; nothing in the engine
//! reaches for a global client. Every store operation is scoped by the
//! caller's `user_id`, matching the row-level security on the backend.

use async_trait::async_trait;
use rivalscan_utils::error::{GatewayError, StoreError};
use rivalscan_utils::types::{
    AnalysisDraft, AnalysisRun, AnalysisUpdate, CostDecision, ProgressStatus, SavedAnalysis,
    Session,
};
use serde_json::Value;

/// Edge function running a multi-provider analysis.
pub const FN_COMPETITOR_ANALYSIS: &str = "competitor-analysis";

/// Edge function deciding whether an analysis run may proceed.
pub const FN_COMPETITOR_ANALYSIS_GATE: &str = "competitor-analysis-gate";

/// Edge function reporting and validating provider API keys.
pub const FN_KEY_MANAGER: &str = "unified-api-key-manager";

/// Privileged edge function completing or failing a run-log row.
pub const FN_UPDATE_ANALYSIS_RUN: &str = "update-analysis-run";

/// Post-save enrichment function.
pub const FN_ENRICH_MASTER_PROFILE: &str = "enrich-analysis-with-master-profile";

/// Legacy post-save aggregation function, always invoked after enrichment.
pub const FN_AGGREGATE_ANALYSIS: &str = "aggregate-analysis";

/// Source of the authenticated caller context.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current session, or `None` when nobody is signed in.
    async fn current_session(&self) -> Option<Session>;
}

/// Row and RPC access to the analysis tables.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// All saved analyses belonging to `user_id`.
    async fn list_analyses(&self, user_id: &str) -> Result<Vec<SavedAnalysis>, StoreError>;

    /// The saved analysis for one session, if any. At most one row exists
    /// per (user, session).
    async fn find_analysis_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<SavedAnalysis>, StoreError>;

    /// Insert a new analysis row and return it as stored.
    async fn insert_analysis(
        &self,
        user_id: &str,
        session_id: &str,
        draft: &AnalysisDraft,
    ) -> Result<SavedAnalysis, StoreError>;

    /// Apply a partial update to an owned row and return the updated row.
    async fn update_analysis(
        &self,
        user_id: &str,
        analysis_id: &str,
        update: &AnalysisUpdate,
    ) -> Result<SavedAnalysis, StoreError>;

    /// Delete an owned row and return it, so the caller can invalidate
    /// cache entries derived from its ids.
    async fn delete_analysis(
        &self,
        user_id: &str,
        analysis_id: &str,
    ) -> Result<SavedAnalysis, StoreError>;

    /// Create a progress row for an upcoming run. Returns the new row id,
    /// or `None` when the backend declined to create one.
    async fn insert_progress(
        &self,
        user_id: &str,
        session_id: &str,
        total_competitors: u32,
        metadata: Value,
    ) -> Result<Option<String>, StoreError>;

    /// Move a session's progress row to `status` with an optional message.
    async fn update_progress(
        &self,
        session_id: &str,
        status: ProgressStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Create a run-log row in `running` state via the privileged RPC.
    /// Returns the new row id, or `None` when creation was declined.
    async fn insert_run(
        &self,
        user_id: &str,
        run_type: &str,
        session_id: &str,
        input: Value,
    ) -> Result<Option<String>, StoreError>;

    /// The most recently started run for a session, if any.
    async fn latest_run_for_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<AnalysisRun>, StoreError>;

    /// Ask the backend whether `projected_cost` fits the monthly budget.
    async fn check_cost_allowed(
        &self,
        user_id: &str,
        projected_cost: f64,
    ) -> Result<CostDecision, StoreError>;

    /// Combined aggregation payload for an analysis, if one exists.
    async fn fetch_combined_aggregate(
        &self,
        user_id: &str,
        analysis_id: &str,
    ) -> Result<Option<Value>, StoreError>;
}

/// Invocation of named edge functions with opaque JSON payloads.
#[async_trait]
pub trait FunctionGateway: Send + Sync {
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, GatewayError>;
}
