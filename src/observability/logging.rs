//! Logging initialization.
//!
//! Logs always go to stderr; stdout carries replies. `SKRONK_LOG_LEVEL`
//! replaces the verbosity-derived filter entirely when set.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{ColorChoice, LogFormat};

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_LEVEL_ENV: &str = "SKRONK_LOG_LEVEL";

/// Crates whose logs stay at `warn` unless asked for explicitly. The
/// Prometheus exporter pulls in an HTTP server that is chatty at debug.
const QUIET_CRATES: [&str; 2] = ["hyper", "metrics_exporter_prometheus"];

/// Maps `-v` count to a level: 0 warn, 1 info, 2 debug, 3+ trace.
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Directive string used when `SKRONK_LOG_LEVEL` is unset.
#[must_use]
pub fn default_directives(verbosity: u8) -> String {
    let level = verbosity_to_directive(verbosity);
    if verbosity < 3 {
        QUIET_CRATES
            .iter()
            .fold(level.to_string(), |acc, krate| format!("{acc},{krate}=warn"))
    } else {
        level.to_string()
    }
}

fn use_ansi(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Human => builder.with_ansi(use_ansi(color)).try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
}
