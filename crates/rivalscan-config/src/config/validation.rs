use rivalscan_utils::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values.
    ///
    /// A single problem is reported as `InvalidValue` with its key; several
    /// problems are aggregated into `ValidationFailed`.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut issues: Vec<(String, String)> = Vec::new();

        if let Some(base_url) = &self.backend.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                issues.push((
                    "backend.base_url".to_string(),
                    format!("'{base_url}' must start with http:// or https://"),
                ));
            }
        }

        if let Some(timeout) = self.backend.request_timeout_secs {
            if timeout == 0 {
                issues.push((
                    "backend.request_timeout_secs".to_string(),
                    "must be greater than 0".to_string(),
                ));
            }
            if timeout > 600 {
                issues.push((
                    "backend.request_timeout_secs".to_string(),
                    "exceeds maximum limit of 600 seconds".to_string(),
                ));
            }
        }

        if let Some(run_type) = &self.analysis.run_type {
            if run_type.is_empty() {
                issues.push((
                    "analysis.run_type".to_string(),
                    "must not be empty".to_string(),
                ));
            }
        }

        if let Some(cost) = self.analysis.cost_per_provider_competitor {
            if !cost.is_finite() || cost < 0.0 {
                issues.push((
                    "analysis.cost_per_provider_competitor".to_string(),
                    "must be a non-negative number".to_string(),
                ));
            }
        }

        if let Some(capacity) = self.analysis.cache_capacity {
            if capacity == 0 {
                issues.push((
                    "analysis.cache_capacity".to_string(),
                    "must be greater than 0".to_string(),
                ));
            }
            if capacity > 100_000 {
                issues.push((
                    "analysis.cache_capacity".to_string(),
                    "exceeds maximum limit of 100,000 entries".to_string(),
                ));
            }
        }

        Self::check_retry_window(
            &mut issues,
            "resilience.invoke",
            self.resilience.invoke_max_retries,
            self.resilience.invoke_backoff_min_ms,
            self.resilience.invoke_backoff_max_ms,
        );
        Self::check_retry_window(
            &mut issues,
            "resilience.read",
            self.resilience.read_max_retries,
            self.resilience.read_backoff_min_ms,
            self.resilience.read_backoff_max_ms,
        );

        if let Some(max_calls) = self.resilience.rate_limit_max_calls {
            if max_calls == 0 {
                issues.push((
                    "resilience.rate_limit_max_calls".to_string(),
                    "must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(window) = self.resilience.rate_limit_window_secs {
            if window == 0 || window > 3600 {
                issues.push((
                    "resilience.rate_limit_window_secs".to_string(),
                    "must be between 1 and 3600 seconds".to_string(),
                ));
            }
        }

        if let Some(threshold) = self.resilience.breaker_failure_threshold {
            if threshold == 0 {
                issues.push((
                    "resilience.breaker_failure_threshold".to_string(),
                    "must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(cooldown) = self.resilience.breaker_cooldown_secs {
            if cooldown == 0 || cooldown > 3600 {
                issues.push((
                    "resilience.breaker_cooldown_secs".to_string(),
                    "must be between 1 and 3600 seconds".to_string(),
                ));
            }
        }

        if let Some(known) = &self.providers.known {
            if known.is_empty() {
                issues.push((
                    "providers.known".to_string(),
                    "must list at least one provider".to_string(),
                ));
            }
            if known.iter().any(|provider| provider.trim().is_empty()) {
                issues.push((
                    "providers.known".to_string(),
                    "provider names must not be empty".to_string(),
                ));
            }
        }

        match issues.len() {
            0 => Ok(()),
            1 => {
                let (key, value) = issues.remove(0);
                Err(ConfigError::InvalidValue { key, value })
            }
            error_count => Err(ConfigError::ValidationFailed {
                errors: issues
                    .into_iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect(),
                error_count,
            }),
        }
    }

    fn check_retry_window(
        issues: &mut Vec<(String, String)>,
        prefix: &str,
        max_retries: Option<u32>,
        backoff_min_ms: Option<u64>,
        backoff_max_ms: Option<u64>,
    ) {
        if let Some(retries) = max_retries {
            if retries > 10 {
                issues.push((
                    format!("{prefix}_max_retries"),
                    "exceeds maximum limit of 10".to_string(),
                ));
            }
        }

        if let Some(min_ms) = backoff_min_ms {
            if min_ms == 0 {
                issues.push((
                    format!("{prefix}_backoff_min_ms"),
                    "must be greater than 0".to_string(),
                ));
            }
        }

        if let (Some(min_ms), Some(max_ms)) = (backoff_min_ms, backoff_max_ms) {
            if max_ms < min_ms {
                issues.push((
                    format!("{prefix}_backoff_max_ms"),
                    format!("must be at least {prefix}_backoff_min_ms ({min_ms}ms)"),
                ));
            }
        }

        if let Some(max_ms) = backoff_max_ms {
            if max_ms > 60_000 {
                issues.push((
                    format!("{prefix}_backoff_max_ms"),
                    "exceeds maximum limit of 60,000ms".to_string(),
                ));
            }
        }
    }
}
