//! Platform collaborators.
//!
//! The penalty engine only talks to the chat platform through the traits in
//! this module: a [`Directory`] that answers membership and role questions,
//! a [`MarkerApplier`] that adds and removes the penalty role, and a
//! [`Responder`] that delivers the user-visible reply for one invocation.
//!
//! [`memory::MemoryDirectory`] implements the first two from configuration.

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

pub use memory::{MemoryDirectory, RecordingResponder};

/// Opaque user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Renders the platform mention for this user.
    #[must_use]
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group (guild) in which a marker has meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role that marks a penalized member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved group member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Member identity
    pub id: UserId,
    /// Display name, used for logging only
    pub name: String,
}

impl Member {
    /// Creates a member.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Renders the platform mention for this member.
    #[must_use]
    pub fn mention(&self) -> String {
        self.id.mention()
    }
}

/// Identity and group resolver.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// The bot's own identity.
    fn bot_id(&self) -> UserId;

    /// Looks up a member of `group`. Returns `Ok(None)` when the user is
    /// not a member.
    async fn member(&self, group: GroupId, user: UserId) -> Result<Option<Member>, PlatformError>;

    /// Finds the role named `name` in `group`, ignoring ASCII case.
    async fn find_marker(&self, group: GroupId, name: &str)
    -> Result<Option<MarkerId>, PlatformError>;

    /// Whether `user` currently holds `marker` in `group`.
    async fn has_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
    ) -> Result<bool, PlatformError>;
}

/// Applies and removes the penalty role.
///
/// Callers log failures and carry on; local bookkeeping does not depend on
/// these calls succeeding.
#[async_trait::async_trait]
pub trait MarkerApplier: Send + Sync {
    /// Adds `marker` to `user`.
    async fn add_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
    ) -> Result<(), PlatformError>;

    /// Removes `marker` from `user`.
    async fn remove_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
    ) -> Result<(), PlatformError>;
}

/// Delivers the reply for a single invocation.
#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    /// Sends `text` back to whoever issued the invocation.
    async fn reply(&self, text: &str) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_uses_platform_syntax() {
        assert_eq!(UserId(42).mention(), "<@42>");
        assert_eq!(Member::new(UserId(7), "bob").mention(), "<@7>");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&GroupId(5)).unwrap();
        assert_eq!(json, "5");
        let user: UserId = serde_json::from_str("9").unwrap();
        assert_eq!(user, UserId(9));
    }
}
