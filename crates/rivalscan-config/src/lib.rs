//! Configuration model, discovery, and validation for rivalscan.
//!
//! Configuration comes from three layers with fixed precedence:
//! CLI arguments > `.rivalscan/config.toml` (discovered upward from the
//! working directory, or pointed at via `--config` / `RIVALSCAN_CONFIG`) >
//! built-in defaults. Each effective value tracks which layer supplied it.

pub mod config;

pub use config::{
    AnalysisConfig, BackendConfig, CliArgs, Config, ConfigBuilder, ConfigSource, ProvidersConfig,
    ResilienceConfig, CONFIG_DIR_NAME, CONFIG_FILE_NAME, CONFIG_PATH_ENV,
    DEFAULT_BREAKER_COOLDOWN_SECS, DEFAULT_BREAKER_FAILURE_THRESHOLD, DEFAULT_CACHE_CAPACITY,
    DEFAULT_COST_PER_PROVIDER_COMPETITOR, DEFAULT_INVOKE_BACKOFF_MAX_MS,
    DEFAULT_INVOKE_BACKOFF_MIN_MS, DEFAULT_INVOKE_MAX_RETRIES, DEFAULT_RATE_LIMIT_MAX_CALLS,
    DEFAULT_RATE_LIMIT_WINDOW_SECS, DEFAULT_READ_BACKOFF_MAX_MS, DEFAULT_READ_BACKOFF_MIN_MS,
    DEFAULT_READ_MAX_RETRIES,
};
