//! Logging infrastructure for rivalscan.
//!
//! Structured logging with `tracing`; the CLI initializes the subscriber once
//! at startup, library crates only emit events. Remote-call outcomes log at
//! `warn` when the workflow continues despite a failure and at `debug` for
//! routine diagnostics.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize tracing subscriber for structured logging.
///
/// Sets up tracing with either compact (default) or verbose format. The
/// `RUST_LOG` environment variable takes precedence over the built-in filter.
///
/// # Arguments
/// * `verbose` - If true, include targets and span close events
///
/// # Returns
/// Result indicating success or failure of initialization
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("rivalscan=debug,info")
            } else {
                EnvFilter::try_new("rivalscan=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}
