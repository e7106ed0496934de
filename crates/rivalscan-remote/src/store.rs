//! PostgREST adapter for the analysis tables.
//!
//! Row reads and mutations go through `{base}/rest/v1/{table}` with
//! `user_id=eq.{id}` filters; privileged writes go through
//! `{base}/rest/v1/rpc/{fn}`. Mutations send `Prefer: return=representation`
//! so the affected row comes back in the same round trip, which is how
//! delete can hand the engine the ids it needs for cache invalidation.

use crate::http::{HttpClient, HttpFailure};
use crate::ports::AnalysisStore;
use async_trait::async_trait;
use reqwest::Response;
use rivalscan_utils::error::StoreError;
use rivalscan_utils::types::{
    AnalysisDraft, AnalysisRun, AnalysisUpdate, CostDecision, ProgressStatus, SavedAnalysis,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Saved-analysis rows.
const TABLE_ANALYSES: &str = "competitor_analyses";

/// Run-log rows.
const TABLE_RUNS: &str = "analysis_runs";

/// Combined aggregation rows keyed by analysis id.
const TABLE_AGGREGATES: &str = "analysis_aggregates";

const RPC_GET_USER_ANALYSES: &str = "get_user_analyses";
const RPC_INSERT_PROGRESS: &str = "insert_analysis_progress";
const RPC_UPDATE_PROGRESS: &str = "update_analysis_progress";
const RPC_INSERT_RUN: &str = "insert_analysis_run";
const RPC_CHECK_COST: &str = "check_analysis_cost";

/// [`AnalysisStore`] backed by Supabase PostgREST.
pub struct SupabaseStore {
    http: Arc<HttpClient>,
}

impl SupabaseStore {
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    fn map_failure(what: &str, failure: HttpFailure) -> StoreError {
        match failure {
            HttpFailure::Denied { status, .. } => {
                StoreError::PermissionDenied(format!("{what}: {status}"))
            }
            HttpFailure::Status { status, detail } => {
                StoreError::Transport(format!("{what}: {status}: {detail}"))
            }
            HttpFailure::Network(message) => StoreError::Transport(format!("{what}: {message}")),
        }
    }

    async fn rows<T: DeserializeOwned>(
        what: &str,
        response: Response,
    ) -> Result<Vec<T>, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("{what}: {e}")))
    }

    /// Call a PostgREST function.
    ///
    /// Void functions answer with an empty body, which decodes to `Null`.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
        debug!(rpc = function, "Calling backend RPC");
        let request = self.http.post(&format!("/rest/v1/rpc/{function}")).json(&args);
        let response = self
            .http
            .send(request)
            .await
            .map_err(|failure| Self::map_failure(function, failure))?;

        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(format!("{function}: {e}")))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("{function}: {e}")))
    }
}

#[async_trait]
impl AnalysisStore for SupabaseStore {
    async fn list_analyses(&self, user_id: &str) -> Result<Vec<SavedAnalysis>, StoreError> {
        let rows = self
            .rpc(RPC_GET_USER_ANALYSES, json!({ "user_id": user_id }))
            .await?;
        if rows.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(rows)
            .map_err(|e| StoreError::Decode(format!("{RPC_GET_USER_ANALYSES}: {e}")))
    }

    async fn find_analysis_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<SavedAnalysis>, StoreError> {
        let path = format!(
            "/rest/v1/{TABLE_ANALYSES}?user_id=eq.{user_id}&session_id=eq.{session_id}&limit=1"
        );
        let response = self
            .http
            .send(self.http.get(&path))
            .await
            .map_err(|failure| Self::map_failure("find analysis by session", failure))?;
        let mut rows: Vec<SavedAnalysis> =
            Self::rows("find analysis by session", response).await?;
        Ok(rows.pop())
    }

    async fn insert_analysis(
        &self,
        user_id: &str,
        session_id: &str,
        draft: &AnalysisDraft,
    ) -> Result<SavedAnalysis, StoreError> {
        let mut body = serde_json::to_value(draft)
            .map_err(|e| StoreError::InvalidRequest(format!("analysis draft: {e}")))?;
        body["user_id"] = json!(user_id);
        body["session_id"] = json!(session_id);

        let request = self
            .http
            .post(&format!("/rest/v1/{TABLE_ANALYSES}"))
            .header("Prefer", "return=representation")
            .json(&body);
        let response = self
            .http
            .send(request)
            .await
            .map_err(|failure| Self::map_failure("insert analysis", failure))?;

        let mut rows: Vec<SavedAnalysis> = Self::rows("insert analysis", response).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Decode("insert analysis: no row returned".to_string()))
    }

    async fn update_analysis(
        &self,
        user_id: &str,
        analysis_id: &str,
        update: &AnalysisUpdate,
    ) -> Result<SavedAnalysis, StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidRequest(
                "no fields set in analysis update".to_string(),
            ));
        }

        let path = format!("/rest/v1/{TABLE_ANALYSES}?id=eq.{analysis_id}&user_id=eq.{user_id}");
        let request = self
            .http
            .patch(&path)
            .header("Prefer", "return=representation")
            .json(update);
        let response = self
            .http
            .send(request)
            .await
            .map_err(|failure| Self::map_failure("update analysis", failure))?;

        let mut rows: Vec<SavedAnalysis> = Self::rows("update analysis", response).await?;
        rows.pop()
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))
    }

    async fn delete_analysis(
        &self,
        user_id: &str,
        analysis_id: &str,
    ) -> Result<SavedAnalysis, StoreError> {
        let path = format!("/rest/v1/{TABLE_ANALYSES}?id=eq.{analysis_id}&user_id=eq.{user_id}");
        let request = self
            .http
            .delete(&path)
            .header("Prefer", "return=representation");
        let response = self
            .http
            .send(request)
            .await
            .map_err(|failure| Self::map_failure("delete analysis", failure))?;

        let mut rows: Vec<SavedAnalysis> = Self::rows("delete analysis", response).await?;
        rows.pop()
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))
    }

    async fn insert_progress(
        &self,
        user_id: &str,
        session_id: &str,
        total_competitors: u32,
        metadata: Value,
    ) -> Result<Option<String>, StoreError> {
        let value = self
            .rpc(
                RPC_INSERT_PROGRESS,
                json!({
                    "session_id": session_id,
                    "user_id": user_id,
                    "total_competitors": total_competitors,
                    "metadata": metadata,
                }),
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn update_progress(
        &self,
        session_id: &str,
        status: ProgressStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.rpc(
            RPC_UPDATE_PROGRESS,
            json!({
                "session_id": session_id,
                "status": status.to_string(),
                "error_message": error_message,
            }),
        )
        .await?;
        Ok(())
    }

    async fn insert_run(
        &self,
        user_id: &str,
        run_type: &str,
        session_id: &str,
        input: Value,
    ) -> Result<Option<String>, StoreError> {
        let value = self
            .rpc(
                RPC_INSERT_RUN,
                json!({
                    "user_id": user_id,
                    "run_type": run_type,
                    "session_id": session_id,
                    "input_payload": input,
                }),
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn latest_run_for_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<AnalysisRun>, StoreError> {
        let path = format!(
            "/rest/v1/{TABLE_RUNS}?user_id=eq.{user_id}&session_id=eq.{session_id}&order=started_at.desc&limit=1"
        );
        let response = self
            .http
            .send(self.http.get(&path))
            .await
            .map_err(|failure| Self::map_failure("latest run for session", failure))?;
        let mut rows: Vec<AnalysisRun> = Self::rows("latest run for session", response).await?;
        Ok(rows.pop())
    }

    async fn check_cost_allowed(
        &self,
        user_id: &str,
        projected_cost: f64,
    ) -> Result<CostDecision, StoreError> {
        let value = self
            .rpc(
                RPC_CHECK_COST,
                json!({ "user_id": user_id, "projected_cost": projected_cost }),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| StoreError::Decode(format!("{RPC_CHECK_COST}: {e}")))
    }

    async fn fetch_combined_aggregate(
        &self,
        user_id: &str,
        analysis_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let path = format!(
            "/rest/v1/{TABLE_AGGREGATES}?analysis_id=eq.{analysis_id}&user_id=eq.{user_id}&select=combined&limit=1"
        );
        let response = self
            .http
            .send(self.http.get(&path))
            .await
            .map_err(|failure| Self::map_failure("fetch combined aggregate", failure))?;
        let mut rows: Vec<CombinedRow> = Self::rows("fetch combined aggregate", response).await?;
        Ok(rows.pop().and_then(|row| row.combined))
    }
}

/// Projection of an aggregation row down to its payload column.
#[derive(Debug, Deserialize)]
struct CombinedRow {
    combined: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn denied_statuses_map_to_permission_errors() {
        let failure = HttpFailure::Denied {
            status: StatusCode::FORBIDDEN,
            detail: "row-level security".to_string(),
        };
        let error = SupabaseStore::map_failure("list analyses", failure);
        assert!(error.is_permission_denied());
    }

    #[test]
    fn other_statuses_map_to_transport_errors() {
        let failure = HttpFailure::Status {
            status: StatusCode::BAD_GATEWAY,
            detail: "upstream".to_string(),
        };
        let error = SupabaseStore::map_failure("insert run", failure);
        assert!(!error.is_permission_denied());
        assert!(error.to_string().contains("insert run"));
        assert!(error.to_string().contains("502"));
    }

    #[test]
    fn network_failures_map_to_transport_errors() {
        let failure = HttpFailure::Network("connection refused".to_string());
        let error = SupabaseStore::map_failure("check cost", failure);
        match error {
            StoreError::Transport(message) => {
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[test]
    fn combined_row_decodes_missing_payload_as_none() {
        let row: CombinedRow = serde_json::from_value(json!({ "combined": null })).unwrap();
        assert!(row.combined.is_none());

        let row: CombinedRow =
            serde_json::from_value(json!({ "combined": { "score": 3 } })).unwrap();
        assert_eq!(row.combined, Some(json!({ "score": 3 })));
    }
}
