//! CLI argument definitions
//!
//! All Clap derive structs for `skronk` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::schema::LedgerScope;

// ============================================================================
// Root CLI
// ============================================================================

/// Time-boxed penalty role bot.
#[derive(Parser, Debug)]
#[command(name = "skronk", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "SKRONK_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "SKRONK_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve slash-command invocations read as NDJSON from stdin.
    Serve(ServeArgs),

    /// Validate configuration files without starting the bot.
    Validate(ValidateArgs),

    /// List the registered slash commands.
    Commands(CommandsArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "SKRONK_CONFIG")]
    pub config: PathBuf,

    /// Write JSONL events to this file.
    #[arg(long, env = "SKRONK_EVENTS_FILE")]
    pub events: Option<PathBuf>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "SKRONK_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Override how penalties are keyed (config file value otherwise).
    #[arg(long, env = "SKRONK_LEDGER_SCOPE")]
    pub ledger_scope: Option<LedgerScope>,

    /// After end of input, wait for active penalties to expire.
    #[arg(long)]
    pub drain: bool,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Enable strict validation (warnings become errors).
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `commands`.
#[derive(Args, Debug)]
pub struct CommandsArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Log output format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
