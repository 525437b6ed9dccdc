// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scratchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scratchrun",
    version,
    about = "Write generated artifacts into a scratch workspace, run them, and clean up.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Scratchrun.toml")]
    pub config: String,

    /// Use the built-in canned artifacts instead of the config's
    /// `[artifact.*]` tables. Runner settings still come from the config
    /// file when it exists.
    #[arg(long)]
    pub demo: bool,

    /// Deploy, print status and tear down right away.
    #[arg(long)]
    pub once: bool,

    /// Parse + validate, print the deployment plan, but don't touch disk
    /// or start processes.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
