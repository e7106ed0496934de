//! CLI command implementations
//!
//! This module contains all the `execute_*` command handlers plus the
//! wiring that turns the discovered [`Config`] into a live
//! [`AnalysisOrchestrator`] backed by the Supabase adapters. Handlers print
//! human-readable text by default and machine-readable JSON when `--json`
//! is set; errors are returned to `run()`, never printed here.

use anyhow::Result;
use camino::Utf8Path;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, Write};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::remote::{EnvSessionProvider, HttpClient, SupabaseFunctions, SupabaseStore};
use crate::types::{new_session_id, AnalysisRequest, PreflightVerdict};
use crate::{AnalysisOrchestrator, Config, OrchestratorBuilder, RivalscanError, SavedAnalysis};

// ============================================================================
// Orchestrator wiring
// ============================================================================

/// Build a live orchestrator from the effective configuration.
///
/// Credentials are read from the environment using the variable names the
/// config chose. The project key is required; the caller's access token
/// falls back to the project key, so key-status queries still carry valid
/// platform credentials when nobody is signed in.
fn build_orchestrator(config: &Config) -> Result<AnalysisOrchestrator, RivalscanError> {
    let base_url = config.require_base_url()?;

    let anon_key = read_env_nonempty(config.key_env()).ok_or_else(|| ConfigError::MissingEnv {
        var: config.key_env().to_string(),
    })?;
    let access_token =
        read_env_nonempty(config.access_token_env()).unwrap_or_else(|| anon_key.clone());

    let http = Arc::new(HttpClient::new(
        base_url,
        &anon_key,
        &access_token,
        config.request_timeout(),
    )?);

    let session = Arc::new(EnvSessionProvider::from_env(
        config.user_id_env(),
        config.access_token_env(),
    ));
    let store = Arc::new(SupabaseStore::new(http.clone()));
    let gateway = Arc::new(SupabaseFunctions::new(http));

    Ok(OrchestratorBuilder::from_config(session, store, gateway, config).build())
}

fn read_env_nonempty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

// ============================================================================
// Start Command
// ============================================================================

/// Execute the start command: run the full gated analysis workflow.
pub async fn execute_start_command(
    competitors: Vec<String>,
    session: Option<String>,
    providers: Vec<String>,
    models: Vec<(String, String)>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    let session_id = session.unwrap_or_else(new_session_id);
    let mut request = AnalysisRequest::new(&session_id, competitors);
    if !providers.is_empty() {
        request = request.with_providers(providers);
    }
    if !models.is_empty() {
        request = request.with_models(models.into_iter().collect::<BTreeMap<_, _>>());
    }

    let started = orchestrator
        .start_analysis(request)
        .await
        .map_err(RivalscanError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&started)?);
    } else {
        println!(
            "✓ Analysis completed for session {} in {}",
            started.session_id,
            format_elapsed(started.execution_time_ms)
        );
        match &started.run_id {
            Some(run_id) => println!("  Run log: {run_id}"),
            None => println!("  Run log: not recorded"),
        }
        for verdict in &started.preflight {
            match verdict {
                PreflightVerdict::Cleared { check } => println!("  Preflight {check}: cleared"),
                PreflightVerdict::Waived { check, reason } => {
                    println!("  Preflight {check}: waived ({reason})");
                }
            }
        }
        match started.output.get("summary").and_then(Value::as_str) {
            Some(summary) => println!("\n{summary}"),
            None => println!("\n{}", serde_json::to_string_pretty(&started.output)?),
        }
    }

    // The auto-save spawned enrichment and aggregation; the process must
    // not exit while they are in flight.
    let outcomes = orchestrator.drain_background_tasks().await;
    for outcome in &outcomes {
        if let Some(error) = &outcome.error {
            eprintln!("Warning: background task '{}' failed: {error}", outcome.name);
        }
    }

    Ok(())
}

// ============================================================================
// List / Show Commands
// ============================================================================

/// Execute the list command
pub async fn execute_list_command(json: bool, config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let analyses = orchestrator
        .get_analyses()
        .await
        .map_err(RivalscanError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analyses)?);
        return Ok(());
    }

    if analyses.is_empty() {
        println!("No saved analyses (is the session configured in the environment?)");
        return Ok(());
    }

    println!("Saved analyses ({}):", analyses.len());
    for analysis in &analyses {
        println!("{}", format_analysis_line(analysis));
    }
    Ok(())
}

/// Execute the show command
pub async fn execute_show_command(id: &str, json: bool, config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let analysis = orchestrator
        .get_analysis_by_id(id)
        .await
        .map_err(RivalscanError::from)?;

    let Some(analysis) = analysis else {
        if json {
            println!("null");
        } else {
            println!("No analysis found with id: {id}");
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis_detail(&analysis);
    }
    Ok(())
}

// ============================================================================
// Export / Delete Commands
// ============================================================================

/// Execute the export command
pub async fn execute_export_command(
    id: &str,
    output: Option<&Utf8Path>,
    config: &Config,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let document = orchestrator
        .export_analysis(id)
        .await
        .map_err(RivalscanError::from)?;

    match output {
        Some(path) => {
            std::fs::write(path, &document).map_err(RivalscanError::from)?;
            println!("Exported analysis {id} to {path}");
        }
        None => println!("{document}"),
    }
    Ok(())
}

/// Execute the delete command
pub async fn execute_delete_command(id: &str, yes: bool, config: &Config) -> Result<()> {
    if !yes {
        let confirmed =
            confirm(&format!("Delete analysis {id}? [y/N] ")).map_err(RivalscanError::from)?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    let orchestrator = build_orchestrator(config)?;
    let deleted = orchestrator
        .delete_analysis(id)
        .await
        .map_err(RivalscanError::from)?;

    println!("Deleted analysis {} ({})", deleted.id, deleted.name);
    Ok(())
}

/// Ask a yes/no question and read one answer line from stdin.
fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

// ============================================================================
// Provider / Key Commands
// ============================================================================

/// Execute the providers command
pub async fn execute_providers_command(json: bool, config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let providers = orchestrator.get_available_providers().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    if providers.is_empty() {
        println!("No providers are ready (no active, validated API key found)");
    } else {
        println!("Ready providers:");
        for provider in &providers {
            println!("  {provider}");
        }
    }
    Ok(())
}

/// Execute the keys command
pub async fn execute_keys_command(json: bool, config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let requirements = orchestrator.check_api_key_requirements().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&requirements)?);
        return Ok(());
    }

    if requirements.has_required_keys {
        println!("✓ At least one provider API key is active");
    } else {
        println!("✗ No active provider API keys");
    }
    if !requirements.missing_keys.is_empty() {
        println!("  Missing: {}", requirements.missing_keys.join(", "));
    }
    Ok(())
}

/// Execute the validate-keys command
pub async fn execute_validate_keys_command(json: bool, config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let results = orchestrator.validate_all_providers().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No providers to validate (no active, validated API key found)");
        return Ok(());
    }

    println!("Provider key validation:");
    for (provider, valid) in &results {
        let mark = if *valid { "✓" } else { "✗" };
        println!("  {mark} {provider}");
    }
    Ok(())
}

// ============================================================================
// Cache Stats Command
// ============================================================================

/// Execute the cache-stats command
///
/// Two passes over every saved row: the first fills the cache, the second
/// must be answered from it (up to the configured capacity).
pub async fn execute_cache_stats_command(json: bool, config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    let analyses = orchestrator
        .get_analyses()
        .await
        .map_err(RivalscanError::from)?;
    for analysis in &analyses {
        for _ in 0..2 {
            orchestrator
                .get_analysis_by_id(&analysis.id)
                .await
                .map_err(RivalscanError::from)?;
        }
    }

    let stats = orchestrator.cache_stats();
    if json {
        let report = json!({
            "rows": analyses.len(),
            "capacity": config.cache_capacity(),
            "hits": stats.hits,
            "misses": stats.misses,
            "writes": stats.writes,
            "invalidations": stats.invalidations,
            "evictions": stats.evictions,
            "hit_ratio": stats.hit_ratio(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Cache over {} rows (capacity {}):",
        analyses.len(),
        config.cache_capacity()
    );
    println!("  Hits: {}", stats.hits);
    println!("  Misses: {}", stats.misses);
    println!("  Writes: {}", stats.writes);
    println!("  Invalidations: {}", stats.invalidations);
    println!("  Evictions: {}", stats.evictions);
    println!("  Hit ratio: {:.0}%", stats.hit_ratio() * 100.0);
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

/// One listing line: id, name, status, creation time.
pub fn format_analysis_line(analysis: &SavedAnalysis) -> String {
    let created = analysis
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "  {:<26} {:<34} {:<10} {created}",
        analysis.id, analysis.name, analysis.status
    )
}

/// Render elapsed milliseconds as `450ms` or `12.3s`.
pub fn format_elapsed(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

fn print_analysis_detail(analysis: &SavedAnalysis) {
    println!("Analysis: {}", analysis.name);
    println!("  Id: {}", analysis.id);
    if let Some(alternate) = &analysis.analysis_id {
        println!("  Alternate id: {alternate}");
    }
    println!("  Session: {}", analysis.session_id);
    println!("  Status: {}", analysis.status);
    if let Some(description) = &analysis.description {
        println!("  Description: {description}");
    }
    if let Some(created_at) = analysis.created_at {
        println!("  Created: {}", created_at.format("%Y-%m-%d %H:%M"));
    }
    if let Some(completed_at) = analysis.completed_at {
        println!("  Completed: {}", completed_at.format("%Y-%m-%d %H:%M"));
    }

    let data = &analysis.analysis_data;
    if let Some(competitors) = &data.competitors {
        println!("  Competitors: {}", competitors.join(", "));
    }
    if let Some(providers) = &data.providers_used {
        println!("  Providers: {}", providers.join(", "));
    }
    if data.combined.is_some() {
        println!("  Combined aggregate: present");
    }
    if let Some(summary) = &data.summary {
        println!("\n{summary}");
    }
}
