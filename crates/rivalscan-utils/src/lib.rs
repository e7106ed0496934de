pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod redact;
pub mod types;

pub use error::{
    ErrorCategory, GatewayError, OrchestratorError, RivalscanError, StoreError, UserFriendlyError,
};
pub use exit_codes::ExitCode;
pub use types::{
    AnalysisData, AnalysisDraft, AnalysisExport, AnalysisProgress, AnalysisRequest, AnalysisRun,
    AnalysisUpdate, CostDecision, GateDecision, KeyRequirements, PreflightCheck, PreflightVerdict,
    ProgressStatus, ProviderKeyStatus, ProviderKind, RunStatus, SavedAnalysis, Session,
    StartedAnalysis,
};
