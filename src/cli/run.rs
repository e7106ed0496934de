//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Builds CliArgs and discovers Config
//! - Initializes tracing and creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output and exit-code mapping

use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use crate::logging;
use crate::redact::redact_secrets;
use crate::{CliArgs, Config, ExitCode, RivalscanError};

/// Main CLI execution function.
///
/// This function handles ALL output including errors. It returns
/// `Result<(), ExitCode>`:
/// - On success: returns `Ok(())` after printing any output
/// - On error: prints the user-friendly report, returns `Err(ExitCode)`
///
/// main.rs only calls `std::process::exit(code.as_i32())` on error - it
/// does NOT print.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    // Build CLI args for the configuration system. A bare flag cannot
    // express "explicitly off", so only a given --verbose overrides the
    // config file.
    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        base_url: cli.base_url.clone(),
        verbose: cli.verbose.then_some(true),
    };

    // Discover and load configuration
    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = RivalscanError::from(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    // try_init fails when a subscriber is already installed; the commands
    // still work without tracing, so report and continue.
    if let Err(error) = logging::init_tracing(config.verbose) {
        eprintln!("Warning: failed to initialize logging: {error}");
    }

    // Create tokio runtime for async operations
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    // Operation name for error context, taken before cli.command is moved
    let operation = match &cli.command {
        Commands::Start { .. } => "start",
        Commands::List => "list",
        Commands::Show { .. } => "show",
        Commands::Export { .. } => "export",
        Commands::Delete { .. } => "delete",
        Commands::Providers => "providers",
        Commands::Keys => "keys",
        Commands::ValidateKeys => "validate-keys",
        Commands::CacheStats => "cache-stats",
    };

    let json = cli.json;
    let result = rt.block_on(async {
        match cli.command {
            Commands::Start {
                competitors,
                session,
                providers,
                models,
            } => {
                commands::execute_start_command(
                    competitors,
                    session,
                    providers,
                    models,
                    json,
                    &config,
                )
                .await
            }
            Commands::List => commands::execute_list_command(json, &config).await,
            Commands::Show { id } => commands::execute_show_command(&id, json, &config).await,
            Commands::Export { id, output } => {
                commands::execute_export_command(&id, output.as_deref(), &config).await
            }
            Commands::Delete { id, yes } => {
                commands::execute_delete_command(&id, yes, &config).await
            }
            Commands::Providers => commands::execute_providers_command(json, &config).await,
            Commands::Keys => commands::execute_keys_command(json, &config).await,
            Commands::ValidateKeys => {
                commands::execute_validate_keys_command(json, &config).await
            }
            Commands::CacheStats => commands::execute_cache_stats_command(json, &config).await,
        }
    });

    // cli::run() handles ALL output including errors. Typed errors go
    // through the user-friendly report, which redacts secrets and carries
    // the exit-code mapping; anything else is an internal failure.
    if let Err(error) = result {
        if let Some(rivalscan_error) = error.downcast_ref::<RivalscanError>() {
            eprintln!("{}", rivalscan_error.display_for_user());
            return Err(rivalscan_error.to_exit_code());
        }

        let redacted = redact_secrets(&error.to_string());
        eprintln!("✗ Unexpected error during {operation}: {redacted}");
        return Err(ExitCode::INTERNAL);
    }

    Ok(())
}
