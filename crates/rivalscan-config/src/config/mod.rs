//! Hierarchical configuration with discovery and precedence.
//!
//! `Config` is assembled from built-in defaults, an optional
//! `.rivalscan/config.toml`, and CLI overrides, in that order. Use
//! [`Config::discover`] for CLI-like behavior, [`Config::builder`] for
//! deterministic programmatic construction.
//!
//! # Configuration file format
//!
//! ```toml
//! verbose = false
//!
//! [backend]
//! base_url = "https://abc.example.co"
//! key_env = "RIVALSCAN_ANON_KEY"
//!
//! [analysis]
//! cost_per_provider_competitor = 0.02
//! cache_capacity = 256
//!
//! [resilience]
//! rate_limit_max_calls = 5
//! rate_limit_window_secs = 10
//!
//! [providers]
//! known = ["openai", "anthropic", "perplexity", "gemini"]
//! ```

mod builder;
mod discovery;
mod model;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::CliArgs;
pub use model::{
    AnalysisConfig, BackendConfig, ProvidersConfig, ResilienceConfig, CONFIG_DIR_NAME,
    CONFIG_FILE_NAME, CONFIG_PATH_ENV, DEFAULT_ACCESS_TOKEN_ENV, DEFAULT_BREAKER_COOLDOWN_SECS,
    DEFAULT_BREAKER_FAILURE_THRESHOLD, DEFAULT_CACHE_CAPACITY,
    DEFAULT_COST_PER_PROVIDER_COMPETITOR, DEFAULT_INVOKE_BACKOFF_MAX_MS,
    DEFAULT_INVOKE_BACKOFF_MIN_MS, DEFAULT_INVOKE_MAX_RETRIES, DEFAULT_KEY_ENV,
    DEFAULT_RATE_LIMIT_MAX_CALLS, DEFAULT_RATE_LIMIT_WINDOW_SECS, DEFAULT_READ_BACKOFF_MAX_MS,
    DEFAULT_READ_BACKOFF_MIN_MS, DEFAULT_READ_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_USER_ID_ENV,
};

use camino::Utf8PathBuf;
use rivalscan_utils::error::ConfigError;
use rivalscan_utils::types::ProviderKind;
use std::collections::HashMap;
use std::time::Duration;
use strum::IntoEnumIterator;

/// Which layer supplied a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    File(Utf8PathBuf),
    Programmatic,
    Default,
}

impl ConfigSource {
    /// Stable label for status display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::File(_) => "config",
            Self::Programmatic => "programmatic",
            Self::Default => "default",
        }
    }
}

/// Effective configuration for rivalscan operations.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub verbose: bool,
    pub backend: BackendConfig,
    pub analysis: AnalysisConfig,
    pub resilience: ResilienceConfig,
    pub providers: ProvidersConfig,
    /// Which layer supplied each setting, keyed by dotted setting name.
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Backend base URL, required for any remote operation.
    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        self.backend
            .base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "backend.base_url".to_string(),
                value: "is required; set it in .rivalscan/config.toml or pass --base-url"
                    .to_string(),
            })
    }

    #[must_use]
    pub fn key_env(&self) -> &str {
        self.backend.key_env.as_deref().unwrap_or(DEFAULT_KEY_ENV)
    }

    #[must_use]
    pub fn access_token_env(&self) -> &str {
        self.backend
            .access_token_env
            .as_deref()
            .unwrap_or(DEFAULT_ACCESS_TOKEN_ENV)
    }

    #[must_use]
    pub fn user_id_env(&self) -> &str {
        self.backend
            .user_id_env
            .as_deref()
            .unwrap_or(DEFAULT_USER_ID_ENV)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.backend
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn run_type(&self) -> &str {
        self.analysis
            .run_type
            .as_deref()
            .unwrap_or(rivalscan_utils::types::RUN_TYPE_COMPETITOR_ANALYSIS)
    }

    #[must_use]
    pub fn cost_per_provider_competitor(&self) -> f64 {
        self.analysis
            .cost_per_provider_competitor
            .unwrap_or(DEFAULT_COST_PER_PROVIDER_COMPETITOR)
    }

    #[must_use]
    pub fn cache_capacity(&self) -> usize {
        self.analysis
            .cache_capacity
            .unwrap_or(DEFAULT_CACHE_CAPACITY)
    }

    #[must_use]
    pub fn invoke_max_retries(&self) -> u32 {
        self.resilience
            .invoke_max_retries
            .unwrap_or(DEFAULT_INVOKE_MAX_RETRIES)
    }

    #[must_use]
    pub fn invoke_backoff_min(&self) -> Duration {
        Duration::from_millis(
            self.resilience
                .invoke_backoff_min_ms
                .unwrap_or(DEFAULT_INVOKE_BACKOFF_MIN_MS),
        )
    }

    #[must_use]
    pub fn invoke_backoff_max(&self) -> Duration {
        Duration::from_millis(
            self.resilience
                .invoke_backoff_max_ms
                .unwrap_or(DEFAULT_INVOKE_BACKOFF_MAX_MS),
        )
    }

    #[must_use]
    pub fn read_max_retries(&self) -> u32 {
        self.resilience
            .read_max_retries
            .unwrap_or(DEFAULT_READ_MAX_RETRIES)
    }

    #[must_use]
    pub fn read_backoff_min(&self) -> Duration {
        Duration::from_millis(
            self.resilience
                .read_backoff_min_ms
                .unwrap_or(DEFAULT_READ_BACKOFF_MIN_MS),
        )
    }

    #[must_use]
    pub fn read_backoff_max(&self) -> Duration {
        Duration::from_millis(
            self.resilience
                .read_backoff_max_ms
                .unwrap_or(DEFAULT_READ_BACKOFF_MAX_MS),
        )
    }

    #[must_use]
    pub fn rate_limit_max_calls(&self) -> usize {
        self.resilience
            .rate_limit_max_calls
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_CALLS)
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(
            self.resilience
                .rate_limit_window_secs
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        )
    }

    #[must_use]
    pub fn breaker_failure_threshold(&self) -> u32 {
        self.resilience
            .breaker_failure_threshold
            .unwrap_or(DEFAULT_BREAKER_FAILURE_THRESHOLD)
    }

    #[must_use]
    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(
            self.resilience
                .breaker_cooldown_secs
                .unwrap_or(DEFAULT_BREAKER_COOLDOWN_SECS),
        )
    }

    /// Known provider vocabulary, falling back to the built-in set.
    #[must_use]
    pub fn known_providers(&self) -> Vec<String> {
        match &self.providers.known {
            Some(known) => known.clone(),
            None => ProviderKind::iter()
                .map(|kind| kind.as_str().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use std::fs;
    use std::path::Path;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use tempfile::TempDir;

    // Global lock for tests that mutate process-global state (env vars).
    // Tests that use `config_env_guard()` will be serialized.
    static CONFIG_ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn config_env_guard() -> MutexGuard<'static, ()> {
        CONFIG_ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap()
    }

    fn create_test_config_file(dir: &Path, content: &str) -> Utf8PathBuf {
        let config_dir = dir.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();

        Utf8PathBuf::from_path_buf(config_path).unwrap()
    }

    fn utf8(path: &Path) -> &Utf8Path {
        Utf8Path::from_path(path).unwrap()
    }

    // Keeps upward discovery from escaping the temp directory.
    fn pin_as_repo_root(dir: &Path) {
        fs::create_dir_all(dir.join(".git")).unwrap();
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.cost_per_provider_competitor(), 0.02);
        assert_eq!(config.cache_capacity(), 256);
        assert_eq!(config.invoke_max_retries(), 2);
        assert_eq!(config.invoke_backoff_min(), Duration::from_millis(200));
        assert_eq!(config.invoke_backoff_max(), Duration::from_millis(1500));
        assert_eq!(config.read_max_retries(), 2);
        assert_eq!(config.read_backoff_min(), Duration::from_millis(150));
        assert_eq!(config.read_backoff_max(), Duration::from_millis(1200));
        assert_eq!(config.rate_limit_max_calls(), 5);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(10));
        assert_eq!(config.breaker_failure_threshold(), 3);
        assert_eq!(config.breaker_cooldown(), Duration::from_secs(15));
        assert_eq!(config.key_env(), "RIVALSCAN_ANON_KEY");
        assert_eq!(config.run_type(), "competitor_analysis");
        assert_eq!(
            config.known_providers(),
            vec!["openai", "anthropic", "perplexity", "gemini"]
        );
        assert!(config.require_base_url().is_err());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());
        create_test_config_file(
            temp_dir.path(),
            r#"
[backend]
base_url = "https://abc.example.co"

[analysis]
cost_per_provider_competitor = 0.05
cache_capacity = 64

[resilience]
rate_limit_max_calls = 9
"#,
        );

        let config = Config::discover_from(utf8(temp_dir.path()), &CliArgs::default()).unwrap();

        assert_eq!(config.require_base_url().unwrap(), "https://abc.example.co");
        assert_eq!(config.cost_per_provider_competitor(), 0.05);
        assert_eq!(config.cache_capacity(), 64);
        assert_eq!(config.rate_limit_max_calls(), 9);
        // Untouched values keep their defaults
        assert_eq!(config.rate_limit_window(), Duration::from_secs(10));

        assert!(matches!(
            config.source_attribution.get("backend.base_url"),
            Some(ConfigSource::File(_))
        ));
        assert_eq!(
            config.source_attribution.get("resilience.rate_limit_window_secs"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());
        create_test_config_file(
            temp_dir.path(),
            r#"
verbose = false

[backend]
base_url = "https://file.example.co"
"#,
        );

        let cli_args = CliArgs {
            base_url: Some("https://cli.example.co".to_string()),
            verbose: Some(true),
            ..Default::default()
        };

        let config = Config::discover_from(utf8(temp_dir.path()), &cli_args).unwrap();

        assert_eq!(config.require_base_url().unwrap(), "https://cli.example.co");
        assert!(config.verbose);
        assert_eq!(
            config.source_attribution.get("backend.base_url"),
            Some(&ConfigSource::Cli)
        );
        assert_eq!(
            config.source_attribution.get("verbose"),
            Some(&ConfigSource::Cli)
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());

        let config = Config::discover_from(utf8(temp_dir.path()), &CliArgs::default()).unwrap();

        assert_eq!(config.cache_capacity(), 256);
        assert!(config.backend.base_url.is_none());
    }

    #[test]
    fn test_explicit_missing_path_errors() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());

        let cli_args = CliArgs {
            config_path: Some(Utf8PathBuf::from("/nonexistent/rivalscan.toml")),
            ..Default::default()
        };

        let result = Config::discover_from(utf8(temp_dir.path()), &cli_args);
        match result.unwrap_err() {
            ConfigError::NotFound { path } => {
                assert_eq!(path, "/nonexistent/rivalscan.toml");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_toml_reports_file() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());
        create_test_config_file(temp_dir.path(), "[backend\nbase_url = oops");

        let result = Config::discover_from(utf8(temp_dir.path()), &CliArgs::default());
        assert!(matches!(result, Err(ConfigError::InvalidFile(_))));
    }

    #[test]
    fn test_env_var_names_explicit_config() {
        let _guard = config_env_guard();

        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("custom.toml");
        fs::write(&config_file, "[analysis]\ncache_capacity = 7\n").unwrap();

        // Safety: the env guard serializes tests that touch process env vars.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &config_file);
        }

        let result = Config::discover(&CliArgs::default());

        // Safety: still serialized by the guard held above.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        let config = result.unwrap();
        assert_eq!(config.cache_capacity(), 7);
        assert!(matches!(
            config.source_attribution.get("analysis.cache_capacity"),
            Some(ConfigSource::File(_))
        ));
    }

    #[test]
    fn test_cli_config_path_beats_env_var() {
        let _guard = config_env_guard();

        let temp_dir = TempDir::new().unwrap();
        let env_file = temp_dir.path().join("env.toml");
        fs::write(&env_file, "[analysis]\ncache_capacity = 7\n").unwrap();
        let cli_file = temp_dir.path().join("cli.toml");
        fs::write(&cli_file, "[analysis]\ncache_capacity = 42\n").unwrap();

        // Safety: the env guard serializes tests that touch process env vars.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &env_file);
        }

        let cli_args = CliArgs {
            config_path: Some(Utf8PathBuf::from_path_buf(cli_file).unwrap()),
            ..Default::default()
        };
        let result = Config::discover(&cli_args);

        // Safety: still serialized by the guard held above.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert_eq!(result.unwrap().cache_capacity(), 42);
    }

    #[test]
    fn test_upward_discovery_from_nested_dir() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());
        create_test_config_file(temp_dir.path(), "[analysis]\ncache_capacity = 11\n");

        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(utf8(&nested), &CliArgs::default()).unwrap();
        assert_eq!(config.cache_capacity(), 11);
    }

    #[test]
    fn test_discovery_stops_at_repo_root_marker() {
        let temp_dir = TempDir::new().unwrap();
        pin_as_repo_root(temp_dir.path());
        // Config lives above an inner repo; discovery from inside the inner
        // repo must not reach it.
        create_test_config_file(temp_dir.path(), "[analysis]\ncache_capacity = 99\n");

        let inner_repo = temp_dir.path().join("inner");
        fs::create_dir_all(inner_repo.join(".git")).unwrap();
        let workdir = inner_repo.join("src");
        fs::create_dir_all(&workdir).unwrap();

        let found = Config::discover_config_file_from(utf8(&workdir));
        assert!(found.is_none());

        // The marker directory itself is still searched.
        create_test_config_file(&inner_repo, "[analysis]\ncache_capacity = 12\n");
        let config = Config::discover_from(utf8(&workdir), &CliArgs::default()).unwrap();
        assert_eq!(config.cache_capacity(), 12);
    }

    #[test]
    fn test_single_invalid_value_is_structured() {
        let result = Config::builder().cache_capacity(0).build();

        match result.unwrap_err() {
            ConfigError::InvalidValue { key, .. } => {
                assert_eq!(key, "analysis.cache_capacity");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_invalid_values_aggregate() {
        let result = Config::builder()
            .cache_capacity(0)
            .rate_limit(0, Duration::from_secs(10))
            .build();

        match result.unwrap_err() {
            ConfigError::ValidationFailed {
                errors,
                error_count,
            } => {
                assert_eq!(error_count, 2);
                assert!(errors.iter().any(|e| e.contains("analysis.cache_capacity")));
                assert!(errors
                    .iter()
                    .any(|e| e.contains("resilience.rate_limit_max_calls")));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_backoff_window_must_be_ordered() {
        let result = Config::builder()
            .invoke_retry(2, Duration::from_millis(500), Duration::from_millis(100))
            .build();

        match result.unwrap_err() {
            ConfigError::InvalidValue { key, .. } => {
                assert_eq!(key, "resilience.invoke_backoff_max_ms");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_builder_sets_programmatic_attribution() {
        let config = Config::builder()
            .base_url("https://programmatic.example.co")
            .cost_per_provider_competitor(0.10)
            .breaker(5, Duration::from_secs(30))
            .build()
            .unwrap();

        assert_eq!(
            config.require_base_url().unwrap(),
            "https://programmatic.example.co"
        );
        assert_eq!(config.cost_per_provider_competitor(), 0.10);
        assert_eq!(config.breaker_failure_threshold(), 5);
        assert_eq!(config.breaker_cooldown(), Duration::from_secs(30));
        assert_eq!(
            config.source_attribution.get("backend.base_url"),
            Some(&ConfigSource::Programmatic)
        );
        assert_eq!(
            config
                .source_attribution
                .get("backend.base_url")
                .map(ConfigSource::label),
            Some("programmatic")
        );
    }

    #[test]
    fn test_base_url_scheme_is_validated() {
        let result = Config::builder().base_url("ftp://bad.example.co").build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
