//! Command-line interface for rivalscan
//!
//! This module provides argument parsing and command dispatch for the
//! rivalscan binary. Commands are thin shells over the orchestration
//! engine; the CLI owns terminal output and exit-code mapping, nothing
//! else.
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions and parsing structures (clap)
//! - `run`: Main entry point and command dispatch
//! - `commands`: Command implementations and orchestrator wiring
//! - `tests`: Test module (cfg(test) only)

pub mod args;
mod commands;
mod run;


// Re-export argument types
pub use args::{build_cli, Cli, Commands};

// Re-export run function
pub use run::run;
