use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use rivalscan_utils::error::ConfigError;

use super::{
    AnalysisConfig, BackendConfig, Config, ConfigSource, ProvidersConfig, ResilienceConfig,
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, CONFIG_PATH_ENV,
};

/// CLI-supplied overrides, decoupled from the clap layer so the config
/// crate stays usable for embedding.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<Utf8PathBuf>,
    pub base_url: Option<String>,
    pub verbose: Option<bool>,
}

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    verbose: Option<bool>,
    backend: Option<BackendConfig>,
    analysis: Option<AnalysisConfig>,
    resilience: Option<ResilienceConfig>,
    providers: Option<ProvidersConfig>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults.
    ///
    /// The config file location itself resolves as explicit `--config` path,
    /// then the `RIVALSCAN_CONFIG` environment variable, then an upward
    /// search from the current working directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("failed to resolve current directory: {e}"),
        })?;
        let start_dir =
            Utf8PathBuf::from_path_buf(start_dir).map_err(|p| ConfigError::DiscoveryFailed {
                reason: format!("current directory is not valid UTF-8: {}", p.display()),
            })?;

        let mut effective = cli_args.clone();
        if effective.config_path.is_none() {
            effective.config_path = env::var(CONFIG_PATH_ENV)
                .ok()
                .filter(|value| !value.is_empty())
                .map(Utf8PathBuf::from);
        }

        Self::discover_from(&start_dir, &effective)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state.
    pub fn discover_from(start_dir: &Utf8Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut source_attribution = HashMap::new();

        let mut verbose = false;
        let mut backend = BackendConfig::default();
        let mut analysis = AnalysisConfig::default();
        let mut resilience = ResilienceConfig::default();
        let mut providers = ProvidersConfig::default();

        for key in [
            "verbose",
            "backend.base_url",
            "backend.key_env",
            "backend.access_token_env",
            "backend.user_id_env",
            "backend.request_timeout_secs",
            "analysis.run_type",
            "analysis.cost_per_provider_competitor",
            "analysis.cache_capacity",
            "resilience.invoke_max_retries",
            "resilience.invoke_backoff_min_ms",
            "resilience.invoke_backoff_max_ms",
            "resilience.read_max_retries",
            "resilience.read_backoff_min_ms",
            "resilience.read_backoff_max_ms",
            "resilience.rate_limit_max_calls",
            "resilience.rate_limit_window_secs",
            "resilience.breaker_failure_threshold",
            "resilience.breaker_cooldown_secs",
            "providers.known",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        // An explicit path must exist; only the upward search may come up empty.
        let config_path = match cli_args.config_path.clone() {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_string(),
                    });
                }
                Some(path)
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)?;
            let config_source = ConfigSource::File(path.clone());

            if let Some(file_verbose) = file_config.verbose {
                verbose = file_verbose;
                source_attribution.insert("verbose".to_string(), config_source.clone());
            }

            if let Some(file_backend) = file_config.backend {
                if file_backend.base_url.is_some() {
                    backend.base_url = file_backend.base_url;
                    source_attribution
                        .insert("backend.base_url".to_string(), config_source.clone());
                }
                if file_backend.key_env.is_some() {
                    backend.key_env = file_backend.key_env;
                    source_attribution.insert("backend.key_env".to_string(), config_source.clone());
                }
                if file_backend.access_token_env.is_some() {
                    backend.access_token_env = file_backend.access_token_env;
                    source_attribution
                        .insert("backend.access_token_env".to_string(), config_source.clone());
                }
                if file_backend.user_id_env.is_some() {
                    backend.user_id_env = file_backend.user_id_env;
                    source_attribution
                        .insert("backend.user_id_env".to_string(), config_source.clone());
                }
                if file_backend.request_timeout_secs.is_some() {
                    backend.request_timeout_secs = file_backend.request_timeout_secs;
                    source_attribution
                        .insert("backend.request_timeout_secs".to_string(), config_source.clone());
                }
            }

            if let Some(file_analysis) = file_config.analysis {
                if file_analysis.run_type.is_some() {
                    analysis.run_type = file_analysis.run_type;
                    source_attribution
                        .insert("analysis.run_type".to_string(), config_source.clone());
                }
                if file_analysis.cost_per_provider_competitor.is_some() {
                    analysis.cost_per_provider_competitor =
                        file_analysis.cost_per_provider_competitor;
                    source_attribution.insert(
                        "analysis.cost_per_provider_competitor".to_string(),
                        config_source.clone(),
                    );
                }
                if file_analysis.cache_capacity.is_some() {
                    analysis.cache_capacity = file_analysis.cache_capacity;
                    source_attribution
                        .insert("analysis.cache_capacity".to_string(), config_source.clone());
                }
            }

            if let Some(file_resilience) = file_config.resilience {
                if file_resilience.invoke_max_retries.is_some() {
                    resilience.invoke_max_retries = file_resilience.invoke_max_retries;
                    source_attribution.insert(
                        "resilience.invoke_max_retries".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.invoke_backoff_min_ms.is_some() {
                    resilience.invoke_backoff_min_ms = file_resilience.invoke_backoff_min_ms;
                    source_attribution.insert(
                        "resilience.invoke_backoff_min_ms".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.invoke_backoff_max_ms.is_some() {
                    resilience.invoke_backoff_max_ms = file_resilience.invoke_backoff_max_ms;
                    source_attribution.insert(
                        "resilience.invoke_backoff_max_ms".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.read_max_retries.is_some() {
                    resilience.read_max_retries = file_resilience.read_max_retries;
                    source_attribution.insert(
                        "resilience.read_max_retries".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.read_backoff_min_ms.is_some() {
                    resilience.read_backoff_min_ms = file_resilience.read_backoff_min_ms;
                    source_attribution.insert(
                        "resilience.read_backoff_min_ms".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.read_backoff_max_ms.is_some() {
                    resilience.read_backoff_max_ms = file_resilience.read_backoff_max_ms;
                    source_attribution.insert(
                        "resilience.read_backoff_max_ms".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.rate_limit_max_calls.is_some() {
                    resilience.rate_limit_max_calls = file_resilience.rate_limit_max_calls;
                    source_attribution.insert(
                        "resilience.rate_limit_max_calls".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.rate_limit_window_secs.is_some() {
                    resilience.rate_limit_window_secs = file_resilience.rate_limit_window_secs;
                    source_attribution.insert(
                        "resilience.rate_limit_window_secs".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.breaker_failure_threshold.is_some() {
                    resilience.breaker_failure_threshold =
                        file_resilience.breaker_failure_threshold;
                    source_attribution.insert(
                        "resilience.breaker_failure_threshold".to_string(),
                        config_source.clone(),
                    );
                }
                if file_resilience.breaker_cooldown_secs.is_some() {
                    resilience.breaker_cooldown_secs = file_resilience.breaker_cooldown_secs;
                    source_attribution.insert(
                        "resilience.breaker_cooldown_secs".to_string(),
                        config_source.clone(),
                    );
                }
            }

            if let Some(file_providers) = file_config.providers {
                if file_providers.known.is_some() {
                    providers.known = file_providers.known;
                    source_attribution.insert("providers.known".to_string(), config_source);
                }
            }
        }

        // CLI overrides win over everything
        if let Some(base_url) = &cli_args.base_url {
            backend.base_url = Some(base_url.clone());
            source_attribution.insert("backend.base_url".to_string(), ConfigSource::Cli);
        }
        if let Some(cli_verbose) = cli_args.verbose {
            verbose = cli_verbose;
            source_attribution.insert("verbose".to_string(), ConfigSource::Cli);
        }

        let config = Self {
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

    /// Search upward from `start_dir` for `.rivalscan/config.toml`.
    ///
    /// Stops at repository root markers (`.git`, `.hg`, `.svn`) or the
    /// filesystem root. The directory holding the marker is itself still
    /// searched.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let candidate = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Some(candidate);
            }

            if current.join(".git").exists()
                || current.join(".hg").exists()
                || current.join(".svn").exists()
            {
                return None;
            }

            let Some(parent) = current.parent() else {
                return None;
            };
            current = parent.to_path_buf();
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// A missing file yields an empty section set so defaults apply.
    fn load_config_file(path: &Utf8Path) -> Result<TomlConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| ConfigError::InvalidFile(format!("{path}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(ConfigError::InvalidFile(format!("{path}: {e}"))),
        }
    }
}
