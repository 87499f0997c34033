//! Bot runtime.
//!
//! [`Bot`] wires the transport, command adapter and penalty controller
//! together and runs the receive loop until end of input or shutdown.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapter::CommandAdapter;
use crate::commands::Invocation;
use crate::config::schema::{BotConfig, LedgerScope};
use crate::error::SkronkError;
use crate::observability::events::{Event, EventEmitter};
use crate::penalty::{ControllerOptions, PenaltyController, PenaltyLedger, PenaltySettings};
use crate::platform::{Directory, MarkerApplier, MemoryDirectory, Responder};
use crate::transport::{Transport, TransportResponder};

/// Options for constructing a [`Bot`].
pub struct BotOptions {
    /// Parsed bot configuration.
    pub config: Arc<BotConfig>,
    /// Where invocations come from and replies go.
    pub transport: Arc<dyn Transport>,
    /// Event emitter for structured events.
    pub events: Arc<EventEmitter>,
    /// CLI override for ledger keying.
    pub ledger_scope: Option<LedgerScope>,
    /// Wait for active penalties to expire after end of input.
    pub drain: bool,
    /// Token for cooperative shutdown.
    pub cancel: CancellationToken,
}

/// A running penalty bot backed by the in-memory platform.
pub struct Bot {
    config: Arc<BotConfig>,
    transport: Arc<dyn Transport>,
    controller: Arc<PenaltyController>,
    adapter: CommandAdapter,
    events: Arc<EventEmitter>,
    drain: bool,
    cancel: CancellationToken,
    watcher_shutdown: CancellationToken,
}

impl Bot {
    /// Creates a bot from the given options.
    ///
    /// When `ledger_scope` is `Some`, it overrides the config file.
    #[must_use]
    pub fn new(opts: BotOptions) -> Self {
        let scope = opts
            .ledger_scope
            .unwrap_or(opts.config.penalty.ledger_scope);
        let directory = Arc::new(MemoryDirectory::from_config(&opts.config));
        let watcher_shutdown = opts.cancel.child_token();
        let controller = Arc::new(PenaltyController::new(ControllerOptions {
            ledger: Arc::new(PenaltyLedger::new(scope)),
            directory: Arc::clone(&directory) as Arc<dyn Directory>,
            applier: directory as Arc<dyn MarkerApplier>,
            settings: PenaltySettings::from_config(&opts.config.penalty, &opts.config.replies),
            events: Arc::clone(&opts.events),
            shutdown: watcher_shutdown.clone(),
        }));

        Self {
            config: opts.config,
            transport: opts.transport,
            adapter: CommandAdapter::new(Arc::clone(&controller)),
            controller,
            events: opts.events,
            drain: opts.drain,
            cancel: opts.cancel,
            watcher_shutdown,
        }
    }

    /// The penalty controller.
    #[must_use]
    pub const fn controller(&self) -> &Arc<PenaltyController> {
        &self.controller
    }

    /// Runs until end of input or cancellation, then shuts down.
    ///
    /// # Errors
    ///
    /// Returns a transport error if reading input fails.
    pub async fn run(&self) -> Result<(), SkronkError> {
        info!(
            bot = %self.config.bot.name,
            guilds = self.config.guilds.len(),
            scope = ?self.controller.ledger().scope(),
            "logged in as [{}]",
            self.config.bot.name
        );
        self.events.emit(Event::ServiceStarted {
            timestamp: Utc::now(),
            bot_name: self.config.bot.name.clone(),
            groups: self.config.guilds.len(),
        });

        let result = self.main_loop().await;

        self.adapter.wait().await;
        let active = self.controller.ledger().len();
        if self.drain && !self.cancel.is_cancelled() {
            info!(active, "waiting for active penalties to expire");
        } else {
            if active > 0 {
                info!(active, "abandoning active penalties");
            }
            self.watcher_shutdown.cancel();
        }
        self.controller.drain().await;

        self.events.emit(Event::ServiceStopped {
            timestamp: Utc::now(),
            reason: match &result {
                Ok(()) if self.cancel.is_cancelled() => "cancelled".to_string(),
                Ok(()) => "EOF".to_string(),
                Err(e) => format!("error: {e}"),
            },
            active_penalties: self.controller.ledger().len(),
        });
        info!("shutdown complete");

        result
    }

    /// Core receive loop.
    async fn main_loop(&self) -> Result<(), SkronkError> {
        loop {
            let inbound = tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("bot cancelled");
                    break;
                }
                msg = self.transport.receive() => msg?,
            };

            let Some(inbound) = inbound else {
                debug!("transport EOF, shutting down");
                break;
            };

            let invocation = Invocation::from(inbound);
            let responder: Arc<dyn Responder> = Arc::new(TransportResponder::new(
                Arc::clone(&self.transport),
                invocation.id.clone(),
            ));
            self.adapter.dispatch(invocation, responder);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("bot", &self.config.bot.name)
            .field("controller", &self.controller)
            .field("drain", &self.drain)
            .finish_non_exhaustive()
    }
}
