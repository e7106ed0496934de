//! rivalscan - resilient orchestration client for competitor-analysis runs
//!
//! rivalscan drives multi-provider competitor analyses against a Supabase
//! backend: API-key and budget gating, progress and run-log bookkeeping,
//! the resilient invocation of the remote analysis function (retry, rate
//! limiting, circuit breaking), and CRUD over the saved results with a
//! bounded in-process cache.
//!
//! rivalscan can be used in two ways:
//! - **CLI**: `cargo install rivalscan` and run from the command line
//! - **Library**: depend on the crate and drive [`AnalysisOrchestrator`]
//!   directly with your own port implementations
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Start an analysis of two competitors with every ready provider
//! rivalscan start "Acme Corp" "Globex"
//!
//! # List and inspect saved analyses
//! rivalscan list
//! rivalscan show analysis-42 --json
//!
//! # Check provider key readiness
//! rivalscan keys
//! rivalscan validate-keys
//! ```
//!
//! Backend credentials come from environment variables whose names are
//! configurable; see the `[backend]` section of `.rivalscan/config.toml`.
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rivalscan::{Config, OrchestratorBuilder};
//! use rivalscan::remote::{EnvSessionProvider, HttpClient, SupabaseFunctions, SupabaseStore};
//!
//! # fn main() -> Result<(), rivalscan::RivalscanError> {
//! let config = Config::builder()
//!     .base_url("https://myproject.supabase.co")
//!     .build()?;
//!
//! let http = Arc::new(HttpClient::new(
//!     config.require_base_url()?,
//!     "anon-key",
//!     "access-token",
//!     config.request_timeout(),
//! )?);
//! let session = Arc::new(EnvSessionProvider::from_env(
//!     config.user_id_env(),
//!     config.access_token_env(),
//! ));
//! let orchestrator = OrchestratorBuilder::from_config(
//!     session,
//!     Arc::new(SupabaseStore::new(http.clone())),
//!     Arc::new(SupabaseFunctions::new(http)),
//!     &config,
//! )
//! .build();
//! # Ok(())
//! # }
//! ```
//!
//! # Stable Public API
//!
//! The following types are the stable surface:
//!
//! - [`AnalysisOrchestrator`] and [`OrchestratorBuilder`] - the engine
//! - [`Config`], [`ConfigBuilder`], [`CliArgs`] - configuration
//! - [`RivalscanError`] - library error type with exit-code mapping
//! - [`ExitCode`] - CLI exit codes
//! - [`AnalysisRequest`], [`StartedAnalysis`], [`SavedAnalysis`],
//!   [`PreflightVerdict`] - the request/result model
//!
//! Internal modules are accessible via module paths but are marked
//! `#[doc(hidden)]` and are not covered by semver stability guarantees.

// ============================================================================
// Stable public API
// ============================================================================

/// The orchestration engine: injected ports, bounded cache, resilience
/// stack, and the gated start-analysis workflow.
pub use rivalscan_engine::{AnalysisOrchestrator, OrchestratorBuilder};

/// Hierarchical configuration with discovery and precedence:
/// CLI arguments > `.rivalscan/config.toml` > built-in defaults.
///
/// Use [`Config::discover()`] for CLI-like behavior or [`Config::builder()`]
/// for programmatic configuration in embedding scenarios.
pub use rivalscan_config::Config;

/// Builder for programmatic configuration without environment or files.
pub use rivalscan_config::ConfigBuilder;

/// CLI-supplied configuration overrides, used with [`Config::discover()`].
pub use rivalscan_config::CliArgs;

/// Library-level error type with user-friendly reporting.
///
/// Library code returns `RivalscanError` and does NOT call
/// `std::process::exit()`; the CLI maps errors to exit codes at its edge via
/// [`to_exit_code()`](RivalscanError::to_exit_code).
pub use rivalscan_utils::error::RivalscanError;

/// Exit codes matching the documented exit-code table (0 through 7).
///
/// The numeric values are part of the public API and will not change within
/// a major release.
pub use rivalscan_utils::exit_codes::ExitCode;

/// Error categories and the user-friendly reporting trait.
pub use rivalscan_utils::error::{ErrorCategory, UserFriendlyError};

/// The request/result model of an analysis run.
pub use rivalscan_utils::types::{
    AnalysisRequest, PreflightCheck, PreflightVerdict, SavedAnalysis, StartedAnalysis,
};

// ============================================================================
// Internal modules - accessible but not stable
// ============================================================================

#[doc(hidden)]
pub use rivalscan_utils::{error, exit_codes, logging, redact, types};

#[doc(hidden)]
pub use rivalscan_config as config;

#[doc(hidden)]
pub use rivalscan_resilience as resilience;

#[doc(hidden)]
pub use rivalscan_remote as remote;

#[doc(hidden)]
pub use rivalscan_engine as engine;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub use rivalscan_remote::test_support;

// CLI module - internal implementation detail, not part of the stable API.
// Exported with #[doc(hidden)] to allow white-box testing of flag parsing.
#[doc(hidden)]
pub mod cli;
