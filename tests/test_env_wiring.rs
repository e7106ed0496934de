//! Tests for environment-driven wiring: the `RIVALSCAN_CONFIG` file
//! override and the session credential variables named by configuration.
//!
//! **WHITE-BOX TEST**: This test uses member-crate APIs
//! (`rivalscan_config::{CONFIG_PATH_ENV, ConfigSource}` and
//! `rivalscan_remote::test_support`) and may break with internal refactors.
//!
//! Every test here mutates process environment variables, so all of them
//! are `#[serial]`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rivalscan::{AnalysisRequest, CliArgs, Config, OrchestratorBuilder};
use rivalscan_config::{CONFIG_PATH_ENV, ConfigSource};
use rivalscan_remote::EnvSessionProvider;
use rivalscan_remote::ports::{
    FN_AGGREGATE_ANALYSIS, FN_COMPETITOR_ANALYSIS, FN_COMPETITOR_ANALYSIS_GATE,
    FN_ENRICH_MASTER_PROFILE, FN_KEY_MANAGER, FN_UPDATE_ANALYSIS_RUN,
};
use rivalscan_remote::test_support::{InMemoryStore, ScriptedGateway};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

/// Write `.rivalscan/config.toml` under `dir` and return its path.
fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_dir = dir.join(".rivalscan");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("config.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

/// Gateway scripted for a fully successful run of every remote function.
fn happy_gateway() -> Arc<ScriptedGateway> {
    let gateway = ScriptedGateway::new();
    gateway.set_default(
        FN_KEY_MANAGER,
        json!({"statuses": [{"provider": "openai", "active": true, "validated": true}]}),
    );
    gateway.set_default(FN_COMPETITOR_ANALYSIS_GATE, json!({"can_proceed": true}));
    gateway.set_default(
        FN_COMPETITOR_ANALYSIS,
        json!({"summary": "Acme Corp leads on pricing"}),
    );
    gateway.set_default(FN_UPDATE_ANALYSIS_RUN, json!({"ok": true}));
    gateway.set_default(FN_ENRICH_MASTER_PROFILE, json!({"enriched": true}));
    gateway.set_default(FN_AGGREGATE_ANALYSIS, json!({"aggregated": true}));
    Arc::new(gateway)
}

#[test]
#[serial]
fn config_env_var_points_discovery_at_a_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = create_config_file(
        temp_dir.path(),
        r#"
[backend]
base_url = "https://wired.supabase.co"
user_id_env = "RIVALSCAN_WIRING_UID"
access_token_env = "RIVALSCAN_WIRING_TOKEN"

[resilience]
invoke_max_retries = 1
"#,
    );

    // Safety: `#[serial]` keeps env-mutating tests from interleaving.
    unsafe {
        env::set_var(CONFIG_PATH_ENV, &config_path);
    }
    let discovered = Config::discover(&CliArgs::default());
    // Safety: still serialized by `#[serial]`.
    unsafe {
        env::remove_var(CONFIG_PATH_ENV);
    }

    let config = discovered?;
    assert_eq!(config.require_base_url()?, "https://wired.supabase.co");
    assert_eq!(config.user_id_env(), "RIVALSCAN_WIRING_UID");
    assert_eq!(config.access_token_env(), "RIVALSCAN_WIRING_TOKEN");
    assert_eq!(config.invoke_max_retries(), 1);

    assert_eq!(
        config
            .source_attribution
            .get("backend.user_id_env")
            .map(ConfigSource::label),
        Some("config")
    );
    assert_eq!(
        config
            .source_attribution
            .get("analysis.run_type")
            .map(ConfigSource::label),
        Some("default")
    );

    Ok(())
}

/// The full embedding flow: a config file names the credential variables,
/// the session provider reads them, and the identity they carry ends up on
/// the saved analysis row.
#[tokio::test]
#[serial]
async fn session_vars_named_by_config_reach_the_saved_row() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = create_config_file(
        temp_dir.path(),
        r#"
[backend]
base_url = "https://wired.supabase.co"
user_id_env = "RIVALSCAN_WIRING_UID"
access_token_env = "RIVALSCAN_WIRING_TOKEN"

[resilience]
invoke_backoff_min_ms = 1
invoke_backoff_max_ms = 2
read_backoff_min_ms = 1
read_backoff_max_ms = 2
"#,
    );

    // Safety: `#[serial]` keeps env-mutating tests from interleaving.
    unsafe {
        env::set_var(CONFIG_PATH_ENV, &config_path);
        env::set_var("RIVALSCAN_WIRING_UID", "user-wired");
        env::set_var("RIVALSCAN_WIRING_TOKEN", "token-wired");
    }
    let config = Config::discover(&CliArgs::default())?;
    let session = Arc::new(EnvSessionProvider::from_env(
        config.user_id_env(),
        config.access_token_env(),
    ));
    // Safety: still serialized by `#[serial]`. The session resolved at
    // construction, so the variables can go away before the run.
    unsafe {
        env::remove_var(CONFIG_PATH_ENV);
        env::remove_var("RIVALSCAN_WIRING_UID");
        env::remove_var("RIVALSCAN_WIRING_TOKEN");
    }

    let store = Arc::new(InMemoryStore::new());
    let gateway = happy_gateway();
    let orchestrator =
        OrchestratorBuilder::from_config(session, store.clone(), gateway.clone(), &config).build();

    let request = AnalysisRequest::new("sess-wired", vec!["Acme Corp".to_string()])
        .with_providers(vec!["openai".to_string()]);
    let started = orchestrator.start_analysis(request).await?;

    assert_eq!(started.session_id, "sess-wired");
    assert!(started.run_id.is_some(), "run log row should be created");
    assert_eq!(gateway.calls(FN_COMPETITOR_ANALYSIS), 1);

    let outcomes = orchestrator.drain_background_tasks().await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success(), "post-save chores should succeed");

    let rows = store.analyses();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].user_id, "user-wired",
        "the identity from the configured variables should own the row"
    );
    assert_eq!(rows[0].session_id, "sess-wired");

    Ok(())
}
