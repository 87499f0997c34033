//! Slash command registry.
//!
//! Commands are static handler values implementing [`SlashCommand`],
//! looked up by name. The registry also provides the definitions printed by
//! `skronk commands` and typo suggestions for unknown names.

pub mod skronk;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::error::CommandError;
use crate::penalty::PenaltyController;
use crate::platform::{GroupId, Responder, UserId};

// ============================================================================
// Definitions
// ============================================================================

/// Kind of value an option carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    /// A member of the group
    User,
    /// Free text
    String,
}

/// One option of a command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOption {
    /// Option name as sent by the platform
    pub name: &'static str,
    /// Help text shown to users
    pub description: &'static str,
    /// Value kind
    pub kind: OptionKind,
    /// Whether the platform requires it
    pub required: bool,
}

/// Registration payload for one command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandDefinition {
    /// Command name, without the leading slash
    pub name: &'static str,
    /// Help text shown to users
    pub description: &'static str,
    /// Whether the command may only be used inside a group
    pub guild_only: bool,
    /// Accepted options
    pub options: &'static [CommandOption],
}

// ============================================================================
// Invocation
// ============================================================================

/// A single command invocation as received from the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Unique id used to correlate logs and the reply
    pub id: String,
    /// Command name
    pub command: String,
    /// Group the command was issued in, if any
    pub group: Option<GroupId>,
    /// Issuing user
    pub user: UserId,
    /// Raw option values keyed by option name
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Invocation {
    /// Renders the invocation the way a user would have typed it, e.g.
    /// `/skronk name:2 timeout:10s`.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut out = format!("/{}", self.command);
        for (name, value) in &self.options {
            let _ = match value {
                serde_json::Value::String(s) => write!(out, " {name}:{s}"),
                other => write!(out, " {name}:{other}"),
            };
        }
        out
    }

    /// Raw value of option `name`.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&serde_json::Value> {
        self.options.get(name).filter(|v| !v.is_null())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Shared state handed to every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Penalty engine
    pub controller: Arc<PenaltyController>,
}

/// A command handler.
#[async_trait::async_trait]
pub trait SlashCommand: Send + Sync {
    /// Registration payload.
    fn definition(&self) -> &'static CommandDefinition;

    /// Handles one invocation, replying through `responder` on success.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`]; the caller turns it into the generic
    /// failure reply.
    async fn process(
        &self,
        ctx: &CommandContext,
        invocation: &Invocation,
        responder: &dyn Responder,
    ) -> Result<(), CommandError>;
}

/// Every registered command.
static COMMANDS: [&dyn SlashCommand; 1] = [&skronk::Skronk];

/// Looks up a command by exact name.
#[must_use]
pub fn find(name: &str) -> Option<&'static dyn SlashCommand> {
    COMMANDS
        .iter()
        .copied()
        .find(|c| c.definition().name == name)
}

/// Suggests the closest registered command name for a typo.
#[must_use]
pub fn suggest(name: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .map(|c| c.definition().name)
        .map(|n| (n, strsim::damerau_levenshtein(name, n)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(n, _)| n)
}

/// Definitions of every registered command, in registry order.
#[must_use]
pub fn definitions() -> Vec<&'static CommandDefinition> {
    COMMANDS.iter().map(|c| c.definition()).collect()
}
