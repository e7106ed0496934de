use std::collections::HashMap;
use std::time::Duration;

use rivalscan_utils::error::ConfigError;

use super::{
    AnalysisConfig, BackendConfig, Config, ConfigSource, ProvidersConfig, ResilienceConfig,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding rivalscan and deterministic behavior is
    /// required: no environment variables or config files are consulted.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for constructing a [`Config`] without discovery.
///
/// Values set here are attributed to `ConfigSource::Programmatic`; anything
/// left unset keeps its built-in default.
///
/// # Example
///
/// ```rust
/// use rivalscan_config::Config;
/// use std::time::Duration;
///
/// let config = Config::builder()
///     .base_url("https://example.supabase.co")
///     .cache_capacity(64)
///     .rate_limit(5, Duration::from_secs(10))
///     .build()?;
/// # Ok::<(), rivalscan_utils::error::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    base_url: Option<String>,
    key_env: Option<String>,
    access_token_env: Option<String>,
    user_id_env: Option<String>,
    request_timeout: Option<Duration>,
    run_type: Option<String>,
    cost_per_provider_competitor: Option<f64>,
    cache_capacity: Option<usize>,
    invoke_retry: Option<(u32, Duration, Duration)>,
    read_retry: Option<(u32, Duration, Duration)>,
    rate_limit: Option<(usize, Duration)>,
    breaker: Option<(u32, Duration)>,
    known_providers: Option<Vec<String>>,
    verbose: Option<bool>,
}

impl ConfigBuilder {
    /// Create a new builder with no values set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend project base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Name the environment variable holding the publishable key.
    #[must_use]
    pub fn key_env(mut self, var: impl Into<String>) -> Self {
        self.key_env = Some(var.into());
        self
    }

    /// Name the environment variable holding the user access token.
    #[must_use]
    pub fn access_token_env(mut self, var: impl Into<String>) -> Self {
        self.access_token_env = Some(var.into());
        self
    }

    /// Name the environment variable holding the user id.
    #[must_use]
    pub fn user_id_env(mut self, var: impl Into<String>) -> Self {
        self.user_id_env = Some(var.into());
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the run type recorded on run-log rows.
    #[must_use]
    pub fn run_type(mut self, run_type: impl Into<String>) -> Self {
        self.run_type = Some(run_type.into());
        self
    }

    /// Set the projected cost per provider per competitor, in USD.
    #[must_use]
    pub fn cost_per_provider_competitor(mut self, cost: f64) -> Self {
        self.cost_per_provider_competitor = Some(cost);
        self
    }

    /// Set the bounded-cache capacity in entries.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set the invoke-path retry schedule.
    #[must_use]
    pub fn invoke_retry(
        mut self,
        max_retries: u32,
        backoff_min: Duration,
        backoff_max: Duration,
    ) -> Self {
        self.invoke_retry = Some((max_retries, backoff_min, backoff_max));
        self
    }

    /// Set the read-path retry schedule.
    #[must_use]
    pub fn read_retry(
        mut self,
        max_retries: u32,
        backoff_min: Duration,
        backoff_max: Duration,
    ) -> Self {
        self.read_retry = Some((max_retries, backoff_min, backoff_max));
        self
    }

    /// Set the sliding-window rate limit.
    #[must_use]
    pub fn rate_limit(mut self, max_calls: usize, window: Duration) -> Self {
        self.rate_limit = Some((max_calls, window));
        self
    }

    /// Set the circuit-breaker trip threshold and cooldown.
    #[must_use]
    pub fn breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.breaker = Some((failure_threshold, cooldown));
        self
    }

    /// Replace the known provider vocabulary.
    #[must_use]
    pub fn known_providers(mut self, providers: Vec<String>) -> Self {
        self.known_providers = Some(providers);
        self
    }

    /// Enable or disable verbose logging.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Build and validate the `Config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any value is out of range, exactly as
    /// discovery-based construction would.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution = HashMap::new();

        let mut backend = BackendConfig::default();
        let mut analysis = AnalysisConfig::default();
        let mut resilience = ResilienceConfig::default();
        let mut providers = ProvidersConfig::default();
        let mut verbose = false;

        if let Some(base_url) = self.base_url {
            backend.base_url = Some(base_url);
            source_attribution.insert("backend.base_url".to_string(), ConfigSource::Programmatic);
        }
        if let Some(key_env) = self.key_env {
            backend.key_env = Some(key_env);
            source_attribution.insert("backend.key_env".to_string(), ConfigSource::Programmatic);
        }
        if let Some(access_token_env) = self.access_token_env {
            backend.access_token_env = Some(access_token_env);
            source_attribution.insert(
                "backend.access_token_env".to_string(),
                ConfigSource::Programmatic,
            );
        }
        if let Some(user_id_env) = self.user_id_env {
            backend.user_id_env = Some(user_id_env);
            source_attribution
                .insert("backend.user_id_env".to_string(), ConfigSource::Programmatic);
        }
        if let Some(timeout) = self.request_timeout {
            backend.request_timeout_secs = Some(timeout.as_secs());
            source_attribution.insert(
                "backend.request_timeout_secs".to_string(),
                ConfigSource::Programmatic,
            );
        }

        if let Some(run_type) = self.run_type {
            analysis.run_type = Some(run_type);
            source_attribution.insert("analysis.run_type".to_string(), ConfigSource::Programmatic);
        }
        if let Some(cost) = self.cost_per_provider_competitor {
            analysis.cost_per_provider_competitor = Some(cost);
            source_attribution.insert(
                "analysis.cost_per_provider_competitor".to_string(),
                ConfigSource::Programmatic,
            );
        }
        if let Some(capacity) = self.cache_capacity {
            analysis.cache_capacity = Some(capacity);
            source_attribution.insert(
                "analysis.cache_capacity".to_string(),
                ConfigSource::Programmatic,
            );
        }

        if let Some((max_retries, backoff_min, backoff_max)) = self.invoke_retry {
            resilience.invoke_max_retries = Some(max_retries);
            resilience.invoke_backoff_min_ms = Some(backoff_min.as_millis() as u64);
            resilience.invoke_backoff_max_ms = Some(backoff_max.as_millis() as u64);
            source_attribution.insert(
                "resilience.invoke_max_retries".to_string(),
                ConfigSource::Programmatic,
            );
        }
        if let Some((max_retries, backoff_min, backoff_max)) = self.read_retry {
            resilience.read_max_retries = Some(max_retries);
            resilience.read_backoff_min_ms = Some(backoff_min.as_millis() as u64);
            resilience.read_backoff_max_ms = Some(backoff_max.as_millis() as u64);
            source_attribution.insert(
                "resilience.read_max_retries".to_string(),
                ConfigSource::Programmatic,
            );
        }
        if let Some((max_calls, window)) = self.rate_limit {
            resilience.rate_limit_max_calls = Some(max_calls);
            resilience.rate_limit_window_secs = Some(window.as_secs());
            source_attribution.insert(
                "resilience.rate_limit_max_calls".to_string(),
                ConfigSource::Programmatic,
            );
        }
        if let Some((threshold, cooldown)) = self.breaker {
            resilience.breaker_failure_threshold = Some(threshold);
            resilience.breaker_cooldown_secs = Some(cooldown.as_secs());
            source_attribution.insert(
                "resilience.breaker_failure_threshold".to_string(),
                ConfigSource::Programmatic,
            );
        }

        if let Some(known) = self.known_providers {
            providers.known = Some(known);
            source_attribution.insert("providers.known".to_string(), ConfigSource::Programmatic);
        }

        if let Some(builder_verbose) = self.verbose {
            verbose = builder_verbose;
            source_attribution.insert("verbose".to_string(), ConfigSource::Programmatic);
        }

        let config = Config {
            verbose,
            backend,
            analysis,
            resilience,
            providers,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }
}
