//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// rivalscan - resilient client for multi-provider competitor analysis
#[derive(Parser)]
#[command(name = "rivalscan")]
#[command(about = "Run and manage multi-provider competitor analyses from the command line")]
#[command(long_about = r#"
rivalscan drives competitor-analysis runs against a Supabase backend: it
checks API keys, budget, and feature gating, starts the remote analysis with
retry, rate limiting, and circuit breaking, and manages the saved results.

EXAMPLES:
  # Start an analysis of two competitors with every ready provider
  rivalscan start "Acme Corp" "Globex"

  # Pick providers and models explicitly
  rivalscan start "Acme Corp" --provider openai --provider gemini \
      --model openai=gpt-4o

  # List saved analyses, then inspect one
  rivalscan list
  rivalscan show analysis-42

  # Export a saved analysis to a file
  rivalscan export analysis-42 --output acme.json

  # Check provider key status before running
  rivalscan keys
  rivalscan validate-keys

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for
  .rivalscan/config.toml; use --config or RIVALSCAN_CONFIG for an explicit
  path. Backend credentials are read from environment variables whose names
  are configurable under [backend].

EXIT CODES:
  0 success          4 no active API keys
  1 internal error   5 budget exceeded
  2 config/usage     6 feature gate denied
  3 auth required    7 analysis run failed

For more information, see: https://github.com/rivalscan/rivalscan
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Backend base URL (e.g. https://myproject.supabase.co)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a competitor-analysis run
    ///
    /// Runs the full gated workflow: key requirement check, cost preflight,
    /// feature gate, progress and run-log rows, then the resilient
    /// invocation of the remote analysis function. The result is saved
    /// under the session and post-save enrichment is awaited before exit.
    ///
    /// EXAMPLES:
    ///   rivalscan start "Acme Corp" "Globex"
    ///   rivalscan start "Acme Corp" --provider openai --model openai=gpt-4o
    ///   rivalscan start "Acme Corp" --session 7f9a1c22 --json
    Start {
        /// Competitor names to analyze (at least one)
        #[arg(required = true, num_args = 1..)]
        competitors: Vec<String>,

        /// Session id to run under (default: a fresh UUID)
        #[arg(long)]
        session: Option<String>,

        /// Provider to use; repeat for several (default: all ready providers)
        #[arg(long = "provider")]
        providers: Vec<String>,

        /// Per-provider model override as provider=model; repeatable
        #[arg(long = "model", value_parser = parse_model_override)]
        models: Vec<(String, String)>,
    },

    /// List saved analyses
    ///
    /// EXAMPLES:
    ///   rivalscan list
    ///   rivalscan list --json
    List,

    /// Show one saved analysis
    ///
    /// Looks the row up by primary or alternate id; repeat reads within one
    /// process are served from the bounded in-memory cache.
    ///
    /// EXAMPLES:
    ///   rivalscan show analysis-42
    ///   rivalscan show analysis-42 --json
    Show {
        /// Analysis id (primary or alternate)
        id: String,
    },

    /// Export a saved analysis as a JSON document
    ///
    /// The document wraps the row with an export timestamp. Without
    /// --output the document goes to stdout.
    ///
    /// EXAMPLES:
    ///   rivalscan export analysis-42
    ///   rivalscan export analysis-42 --output acme.json
    Export {
        /// Analysis id (primary or alternate)
        id: String,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<Utf8PathBuf>,
    },

    /// Delete a saved analysis
    ///
    /// EXAMPLES:
    ///   rivalscan delete analysis-42
    ///   rivalscan delete analysis-42 --yes
    Delete {
        /// Analysis id
        id: String,

        /// Delete without asking for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// List providers with an active, validated API key
    ///
    /// EXAMPLES:
    ///   rivalscan providers
    ///   rivalscan providers --json
    Providers,

    /// Check whether any provider API key is active
    ///
    /// The requirement is "at least one active key of any kind"; the output
    /// lists providers still missing a key.
    Keys,

    /// Validate every ready provider key against the backend
    ///
    /// Providers are checked one at a time; an individual failure is
    /// reported as invalid instead of aborting the sweep.
    ValidateKeys,

    /// Exercise the analysis cache and report its counters
    ///
    /// Loads the saved-analysis list, fetches every row twice through the
    /// cache, and prints hit/miss/eviction counters. Useful for sizing
    /// `analysis.cache_capacity`.
    CacheStats,
}

/// Parse one `provider=model` override.
fn parse_model_override(raw: &str) -> Result<(String, String), String> {
    let Some((provider, model)) = raw.split_once('=') else {
        return Err(format!("expected provider=model, got '{raw}'"));
    };
    let (provider, model) = (provider.trim(), model.trim());
    if provider.is_empty() || model.is_empty() {
        return Err(format!("expected provider=model, got '{raw}'"));
    }
    Ok((provider.to_string(), model.to_string()))
}

/// Build the CLI command structure without parsing arguments
/// This is used for introspection in tests and documentation validation
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
