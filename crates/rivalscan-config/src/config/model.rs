use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use rivalscan_utils::types::{ProviderKind, RUN_TYPE_COMPETITOR_ANALYSIS};

/// Directory searched for upward from the working directory.
pub const CONFIG_DIR_NAME: &str = ".rivalscan";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable naming an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "RIVALSCAN_CONFIG";

/// Default env var holding the backend publishable key.
pub const DEFAULT_KEY_ENV: &str = "RIVALSCAN_ANON_KEY";

/// Default env var holding the signed-in user's access token.
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "RIVALSCAN_ACCESS_TOKEN";

/// Default env var holding the signed-in user's id.
pub const DEFAULT_USER_ID_ENV: &str = "RIVALSCAN_USER_ID";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default projected cost per provider per competitor, in USD.
pub const DEFAULT_COST_PER_PROVIDER_COMPETITOR: f64 = 0.02;

/// Default bounded-cache capacity in entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

pub const DEFAULT_INVOKE_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INVOKE_BACKOFF_MIN_MS: u64 = 200;
pub const DEFAULT_INVOKE_BACKOFF_MAX_MS: u64 = 1500;

pub const DEFAULT_READ_MAX_RETRIES: u32 = 2;
pub const DEFAULT_READ_BACKOFF_MIN_MS: u64 = 150;
pub const DEFAULT_READ_BACKOFF_MAX_MS: u64 = 1200;

pub const DEFAULT_RATE_LIMIT_MAX_CALLS: usize = 5;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 10;

pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 15;

/// Backend endpoint configuration.
///
/// Secrets never live in the config file; `key_env`, `access_token_env`,
/// and `user_id_env` name the environment variables that hold them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://abc.example.co`.
    pub base_url: Option<String>,
    pub key_env: Option<String>,
    pub access_token_env: Option<String>,
    pub user_id_env: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            key_env: Some(DEFAULT_KEY_ENV.to_string()),
            access_token_env: Some(DEFAULT_ACCESS_TOKEN_ENV.to_string()),
            user_id_env: Some(DEFAULT_USER_ID_ENV.to_string()),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Analysis run settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub run_type: Option<String>,
    /// Projected cost per provider per competitor, in USD.
    pub cost_per_provider_competitor: Option<f64>,
    pub cache_capacity: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            run_type: Some(RUN_TYPE_COMPETITOR_ANALYSIS.to_string()),
            cost_per_provider_competitor: Some(DEFAULT_COST_PER_PROVIDER_COMPETITOR),
            cache_capacity: Some(DEFAULT_CACHE_CAPACITY),
        }
    }
}

/// Retry, rate-limit, and breaker settings.
///
/// The invoke path covers the analysis edge function; the read path
/// covers list and lookup calls against the store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    pub invoke_max_retries: Option<u32>,
    pub invoke_backoff_min_ms: Option<u64>,
    pub invoke_backoff_max_ms: Option<u64>,
    pub read_max_retries: Option<u32>,
    pub read_backoff_min_ms: Option<u64>,
    pub read_backoff_max_ms: Option<u64>,
    pub rate_limit_max_calls: Option<usize>,
    pub rate_limit_window_secs: Option<u64>,
    pub breaker_failure_threshold: Option<u32>,
    pub breaker_cooldown_secs: Option<u64>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            invoke_max_retries: Some(DEFAULT_INVOKE_MAX_RETRIES),
            invoke_backoff_min_ms: Some(DEFAULT_INVOKE_BACKOFF_MIN_MS),
            invoke_backoff_max_ms: Some(DEFAULT_INVOKE_BACKOFF_MAX_MS),
            read_max_retries: Some(DEFAULT_READ_MAX_RETRIES),
            read_backoff_min_ms: Some(DEFAULT_READ_BACKOFF_MIN_MS),
            read_backoff_max_ms: Some(DEFAULT_READ_BACKOFF_MAX_MS),
            rate_limit_max_calls: Some(DEFAULT_RATE_LIMIT_MAX_CALLS),
            rate_limit_window_secs: Some(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            breaker_failure_threshold: Some(DEFAULT_BREAKER_FAILURE_THRESHOLD),
            breaker_cooldown_secs: Some(DEFAULT_BREAKER_COOLDOWN_SECS),
        }
    }
}

/// Known provider vocabulary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    pub known: Option<Vec<String>>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            known: Some(
                ProviderKind::iter()
                    .map(|kind| kind.as_str().to_string())
                    .collect(),
            ),
        }
    }
}
