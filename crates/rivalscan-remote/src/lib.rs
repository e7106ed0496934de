//! Backend ports and adapters for rivalscan.
//!
//! The orchestration engine talks to the backend exclusively through the
//! traits in [`ports`]: [`SessionProvider`] for the authenticated caller,
//! [`AnalysisStore`] for row and RPC access, and [`FunctionGateway`] for
//! edge function invocation. Production adapters ([`SupabaseStore`],
//! [`SupabaseFunctions`]) speak PostgREST and the functions endpoint over a
//! shared [`HttpClient`]; the `test-utils` feature exposes in-memory doubles
//! for every port.

pub mod functions;
pub mod http;
pub mod ports;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use functions::SupabaseFunctions;
pub use http::HttpClient;
pub use ports::{
    AnalysisStore, FunctionGateway, SessionProvider, FN_AGGREGATE_ANALYSIS, FN_COMPETITOR_ANALYSIS,
    FN_COMPETITOR_ANALYSIS_GATE, FN_ENRICH_MASTER_PROFILE, FN_KEY_MANAGER, FN_UPDATE_ANALYSIS_RUN,
};
pub use session::EnvSessionProvider;
pub use store::SupabaseStore;
