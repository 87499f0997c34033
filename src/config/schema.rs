//! Configuration schema types
//!
//! These types are deserialized from the bot's YAML configuration file.

use serde::{Deserialize, Serialize};

use crate::platform::{GroupId, MarkerId, UserId};

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for a `skronk` bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BotConfig {
    /// The bot's own identity (required)
    pub bot: BotIdentity,

    /// Penalty engine settings
    #[serde(default)]
    pub penalty: PenaltyConfig,

    /// Reply templates
    #[serde(default)]
    pub replies: ReplyTemplates,

    /// Groups served by the in-memory platform
    #[serde(default)]
    pub guilds: Vec<GuildConfig>,
}

/// The bot's own identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIdentity {
    /// User id of the bot
    pub id: UserId,

    /// Display name of the bot
    pub name: String,
}

// ============================================================================
// Penalty Settings
// ============================================================================

/// Name of the role applied to penalized members.
pub const DEFAULT_MARKER_NAME: &str = "SKRONK'd";

/// Fallback penalty length when a trigger gives no usable timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Penalty engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Role name looked up in each group, ignoring ASCII case
    pub marker_name: String,

    /// Default penalty length as a duration expression ("60s", "5m") or
    /// plain seconds
    pub default_timeout: String,

    /// How ledger entries are keyed
    pub ledger_scope: LedgerScope,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            marker_name: DEFAULT_MARKER_NAME.to_string(),
            default_timeout: format!("{DEFAULT_TIMEOUT_SECS}s"),
            ledger_scope: LedgerScope::default(),
        }
    }
}

/// Ledger keying scope.
///
/// - `per_group`: entries are keyed by `(group, user)`.
/// - `global`: entries are keyed by user only, so the same user id in two
///   groups shares one penalty and one expiry watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LedgerScope {
    /// One ledger entry per user across every group
    Global,
    /// One ledger entry per user per group
    #[default]
    PerGroup,
}

// ============================================================================
// Replies
// ============================================================================

/// User-facing reply templates.
///
/// `{mention}` expands to the penalized member's mention, `{duration}` to the
/// remaining penalty total and `{error}` to the failing error's kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyTemplates {
    /// First line when a target is penalized
    pub penalized: String,

    /// First line when a trigger against the bot lands on the requester
    pub backfire: String,

    /// Last line of every applied penalty
    pub countdown: String,

    /// Reply to a requester who is currently penalized
    pub rejected: String,

    /// Generic reply when processing fails
    pub failure: String,
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            penalized: "GET SKRONK'D {mention}".to_string(),
            backfire: "YA TRYNA SKRONK ME?!? {mention}".to_string(),
            countdown: "(See you in {duration})".to_string(),
            rejected: "Can't skronk if you're skronk'd!".to_string(),
            failure: ":x: Ran into a(n) *{error}*".to_string(),
        }
    }
}

// ============================================================================
// Guilds
// ============================================================================

/// A group served by the in-memory platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Group id
    pub id: GroupId,

    /// Group display name
    pub name: String,

    /// Roles defined in the group
    #[serde(default)]
    pub roles: Vec<RoleConfig>,

    /// Members of the group (the bot is always a member)
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

/// A role defined in a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Role id
    pub id: MarkerId,

    /// Role name
    pub name: String,
}

/// A member of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    /// User id
    pub id: UserId,

    /// Display name
    pub name: String,

    /// Role ids held at startup
    #[serde(default)]
    pub roles: Vec<MarkerId>,
}
