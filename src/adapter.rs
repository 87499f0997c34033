//! Command adapter.
//!
//! Receives invocations from a transport and runs each one on its own task.
//! Errors and panics never escape a task: they are logged and answered with
//! the generic failure reply.

use std::any::Any;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::commands::{self, CommandContext, Invocation};
use crate::error::CommandError;
use crate::observability::events::Event;
use crate::observability::metrics;
use crate::penalty::PenaltyController;
use crate::platform::Responder;

/// Error name reported when a command panics.
const PANIC_KIND: &str = "Panic";

/// Dispatches invocations to registered commands.
#[derive(Debug)]
pub struct CommandAdapter {
    ctx: Arc<CommandContext>,
    tasks: TaskTracker,
}

impl CommandAdapter {
    /// Creates an adapter backed by `controller`.
    #[must_use]
    pub fn new(controller: Arc<PenaltyController>) -> Self {
        Self {
            ctx: Arc::new(CommandContext { controller }),
            tasks: TaskTracker::new(),
        }
    }

    /// Spawns a task that handles `invocation`.
    pub fn dispatch(&self, invocation: Invocation, responder: Arc<dyn Responder>) -> JoinHandle<()> {
        info!(id = %invocation.id, command = %invocation.command_string(), "received invocation");
        metrics::record_invocation(&invocation.command);
        let ctx = Arc::clone(&self.ctx);
        self.tasks
            .spawn(async move { handle(&ctx, &invocation, responder.as_ref()).await })
    }

    /// Number of invocations still being handled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every dispatched invocation to finish.
    pub async fn wait(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Runs one invocation to completion, replying on failure.
pub async fn handle(ctx: &CommandContext, invocation: &Invocation, responder: &dyn Responder) {
    let result = AssertUnwindSafe(execute(ctx, invocation, responder))
        .catch_unwind()
        .await;

    let (kind, suggestion) = match result {
        Ok(Ok(())) => return,
        Ok(Err(e)) => {
            error!(id = %invocation.id, command = %invocation.command_string(), error = %e, "command failed");
            metrics::record_error("command");
            if matches!(e, CommandError::Trigger(_)) {
                metrics::record_trigger("failed");
            }
            let suggestion = match &e {
                CommandError::UnknownCommand(name) => commands::suggest(name),
                _ => None,
            };
            (e.kind(), suggestion)
        }
        Err(panic) => {
            error!(
                id = %invocation.id,
                command = %invocation.command_string(),
                panic = %panic_message(panic.as_ref()),
                "command panicked"
            );
            metrics::record_error("panic");
            (PANIC_KIND, None)
        }
    };

    let mut reply = ctx
        .controller
        .settings()
        .replies
        .failure
        .replace("{error}", kind);
    if let Some(name) = suggestion {
        let _ = write!(reply, "\nDid you mean `/{name}`?");
    }

    ctx.controller.events().emit(Event::TriggerFailed {
        timestamp: Utc::now(),
        invocation_id: invocation.id.clone(),
        error: kind.to_string(),
    });
    if let Err(e) = responder.reply(&reply).await {
        warn!(id = %invocation.id, error = %e, "failed to deliver failure reply");
        metrics::record_error("reply");
    }
}

async fn execute(
    ctx: &CommandContext,
    invocation: &Invocation,
    responder: &dyn Responder,
) -> Result<(), CommandError> {
    let command = commands::find(&invocation.command)
        .ok_or_else(|| CommandError::UnknownCommand(invocation.command.clone()))?;
    command.process(ctx, invocation, responder).await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
