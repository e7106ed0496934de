//! Core domain types shared across the rivalscan crates.
//!
//! Everything here mirrors rows and payloads owned by the remote backend;
//! the client never persists any of these locally. Serde attributes follow
//! the backend's column and payload naming, so these types serialize straight
//! onto the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

/// Run type recorded on every analysis run row.
pub const RUN_TYPE_COMPETITOR_ANALYSIS: &str = "competitor_analysis";

/// Generate a fresh client-side correlation id for one analysis attempt.
///
/// The session id groups the progress row, the run-log row, and the persisted
/// result of a single run. It is generated client-side so the id exists
/// before any remote row does.
#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// AI providers this client knows how to select and configure.
///
/// The backend reports provider names as strings and may grow new ones ahead
/// of this client; wire-level fields therefore stay `String` and this enum is
/// the client-side vocabulary for CLI parsing and configuration defaults.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Perplexity,
    Gemini,
}

impl ProviderKind {
    /// Wire name of this provider.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Perplexity => "perplexity",
            Self::Gemini => "gemini",
        }
    }
}

/// Authenticated caller context resolved at the start of each operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

impl Session {
    #[must_use]
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Lifecycle state of an analysis run row.
///
/// A run is created as `Running` and moved exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One execution attempt, persisted remotely as a run-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub run_type: String,
    pub input_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_payload: Option<Value>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Lifecycle state of a progress row.
///
/// The client only ever writes `Failed`; the other transitions are driven by
/// the remote analysis function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Per-session progress row for an in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisProgress {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub total_competitors: u32,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Typed view of an analysis result payload.
///
/// Provider pipelines return loosely shaped JSON. This struct names the
/// fields the client actually reads and keeps everything else in `extra`, so
/// unknown provider sections survive a round trip. [`Self::from_value`]
/// rejects anything that is not a JSON object, which is the validation point
/// for payloads entering the client from the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AnalysisData {
    /// Validate and convert a raw JSON payload.
    ///
    /// Fails for non-object payloads (arrays, strings, null). Object payloads
    /// always succeed; unrecognized keys land in `extra`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Serialize back to the raw JSON shape the backend stores.
    #[must_use]
    pub fn to_value(&self) -> Value {
        // An object of only serializable fields cannot fail to serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Whether the payload carries a combined aggregation section.
    #[must_use]
    pub fn has_combined(&self) -> bool {
        self.combined.is_some()
    }
}

/// Persisted result of a completed run.
///
/// At most one row exists per (user, session): writes go through an
/// upsert-by-session lookup rather than blind inserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAnalysis {
    pub id: String,
    /// Alternate identifier some backend paths key on; lookups match either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    pub session_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub analysis_data: AnalysisData,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SavedAnalysis {
    /// Whether `candidate` matches this row's primary or alternate id.
    #[must_use]
    pub fn matches_id(&self, candidate: &str) -> bool {
        self.id == candidate || self.analysis_id.as_deref() == Some(candidate)
    }
}

/// Fields the caller provides when persisting an analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub analysis_data: AnalysisData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AnalysisDraft {
    #[must_use]
    pub fn new(analysis_data: AnalysisData) -> Self {
        Self {
            analysis_data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Partial update for an existing analysis row.
///
/// `None` fields are left untouched by the backend, so serialization skips
/// them entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_data: Option<AnalysisData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AnalysisUpdate {
    /// True when no field is set; the store rejects empty updates early.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.analysis_data.is_none()
            && self.status.is_none()
    }
}

/// Parameters for one `start analysis` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub session_id: String,
    pub competitors: Vec<String>,
    /// Caller-selected providers; empty means "discover what is available".
    #[serde(default)]
    pub providers: Vec<String>,
    /// Optional provider-to-model overrides passed through to the backend.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, String>,
}

impl AnalysisRequest {
    #[must_use]
    pub fn new(session_id: impl Into<String>, competitors: Vec<String>) -> Self {
        Self {
            session_id: session_id.into(),
            competitors,
            providers: Vec::new(),
            models: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers;
        self
    }

    #[must_use]
    pub fn with_models(mut self, models: BTreeMap<String, String>) -> Self {
        self.models = models;
        self
    }
}

/// Key status for one provider as reported by the remote key manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderKeyStatus {
    pub provider: String,
    pub active: bool,
    #[serde(default)]
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

/// Result of the API-key requirement gate.
///
/// The requirement is "at least one active key of any kind"; no specific
/// provider is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequirements {
    pub has_required_keys: bool,
    #[serde(default)]
    pub missing_keys: Vec<String>,
}

/// Response of the remote budget-check RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
}

/// Response of the remote feature-gate function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub can_proceed: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Which pre-run check a verdict refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PreflightCheck {
    CostEstimate,
    FeatureGate,
    RunLog,
}

/// Outcome of one pre-run check.
///
/// Checks whose transport failed are `Waived` with the reason attached, so
/// the log-and-continue policy is visible in the returned run summary instead
/// of only in log output. Explicit denials never produce a verdict; they
/// abort the run with a typed error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PreflightVerdict {
    Cleared { check: PreflightCheck },
    Waived { check: PreflightCheck, reason: String },
}

impl PreflightVerdict {
    #[must_use]
    pub fn check(&self) -> PreflightCheck {
        match self {
            Self::Cleared { check } | Self::Waived { check, .. } => *check,
        }
    }

    #[must_use]
    pub fn is_waived(&self) -> bool {
        matches!(self, Self::Waived { .. })
    }
}

/// What a successful `start analysis` run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedAnalysis {
    pub session_id: String,
    /// Run-log row id; `None` when run-log creation was waived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Raw result payload from the remote analysis function.
    pub output: Value,
    pub execution_time_ms: u64,
    pub preflight: Vec<PreflightVerdict>,
}

/// Export document wrapping a saved analysis with its export timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisExport {
    pub exported_at: DateTime<Utc>,
    pub analysis: SavedAnalysis,
}
