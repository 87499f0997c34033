//! `skronk serve`

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bot::{Bot, BotOptions};
use crate::cli::args::ServeArgs;
use crate::config::loader::ConfigLoader;
use crate::error::SkronkError;
use crate::observability::events::EventEmitter;
use crate::transport::StdioTransport;

/// Start the bot on stdio.
///
/// # Errors
///
/// Returns a config error if the configuration fails to load, or a
/// transport error if reading stdin fails.
pub async fn run(args: &ServeArgs, cancel: CancellationToken) -> Result<(), SkronkError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    tracing::info!(config = %args.config.display(), "loading configuration");
    let load_result = ConfigLoader::with_defaults().load(&args.config)?;
    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    let events = match args.events {
        Some(ref path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    let bot = Bot::new(BotOptions {
        config: load_result.config,
        transport: Arc::new(StdioTransport::stdio()),
        events: Arc::new(events),
        ledger_scope: args.ledger_scope,
        drain: args.drain,
        cancel,
    });
    bot.run().await
}
