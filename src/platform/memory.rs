//! In-memory platform.
//!
//! Holds groups, roles and members in a `DashMap` so the bot can run
//! without a chat gateway. Populated from [`BotConfig`] at startup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;

use super::{Directory, GroupId, MarkerApplier, MarkerId, Member, Responder, UserId};
use crate::config::schema::BotConfig;
use crate::error::PlatformError;

#[derive(Debug, Default)]
struct MemoryGroup {
    name: String,
    roles: Vec<(MarkerId, String)>,
    members: HashMap<UserId, MemoryMember>,
}

#[derive(Debug, Default)]
struct MemoryMember {
    name: String,
    roles: HashSet<MarkerId>,
}

/// Directory and marker applier backed by process memory.
///
/// Marker updates can be forced to fail with
/// [`fail_marker_updates`](Self::fail_marker_updates) to exercise the
/// engine's failure handling.
#[derive(Debug)]
pub struct MemoryDirectory {
    bot: Member,
    groups: DashMap<GroupId, MemoryGroup>,
    fail_marker_updates: AtomicBool,
}

impl MemoryDirectory {
    /// Creates an empty platform for the given bot identity.
    #[must_use]
    pub fn new(bot: Member) -> Self {
        Self {
            bot,
            groups: DashMap::new(),
            fail_marker_updates: AtomicBool::new(false),
        }
    }

    /// Builds the platform described by `config`.
    ///
    /// Role grants that reference roles missing from the guild are still
    /// recorded; validation reports them separately.
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        let directory = Self::new(Member::new(config.bot.id, config.bot.name.clone()));
        for guild in &config.guilds {
            directory.add_group(guild.id, guild.name.clone());
            for role in &guild.roles {
                directory.add_role(guild.id, role.id, role.name.clone());
            }
            for member in &guild.members {
                directory.add_member(guild.id, Member::new(member.id, member.name.clone()));
                for role in &member.roles {
                    directory.grant_role(guild.id, member.id, *role);
                }
            }
        }
        directory
    }

    /// Registers a group. The bot joins it automatically.
    pub fn add_group(&self, id: GroupId, name: impl Into<String>) {
        let mut group = MemoryGroup {
            name: name.into(),
            ..MemoryGroup::default()
        };
        group.members.insert(
            self.bot.id,
            MemoryMember {
                name: self.bot.name.clone(),
                roles: HashSet::new(),
            },
        );
        self.groups.insert(id, group);
    }

    /// Defines a role in `group`. Unknown groups are ignored.
    pub fn add_role(&self, group: GroupId, id: MarkerId, name: impl Into<String>) {
        if let Some(mut g) = self.groups.get_mut(&group) {
            g.roles.push((id, name.into()));
        }
    }

    /// Adds a member to `group`. Unknown groups are ignored.
    pub fn add_member(&self, group: GroupId, member: Member) {
        if let Some(mut g) = self.groups.get_mut(&group) {
            g.members.entry(member.id).or_default().name = member.name;
        }
    }

    /// Grants `marker` to `user` directly, bypassing failure injection.
    pub fn grant_role(&self, group: GroupId, user: UserId, marker: MarkerId) {
        if let Some(mut g) = self.groups.get_mut(&group) {
            if let Some(m) = g.members.get_mut(&user) {
                m.roles.insert(marker);
            }
        }
    }

    /// Whether `user` holds `marker` right now.
    #[must_use]
    pub fn holds(&self, group: GroupId, user: UserId, marker: MarkerId) -> bool {
        self.groups
            .get(&group)
            .and_then(|g| g.members.get(&user).map(|m| m.roles.contains(&marker)))
            .unwrap_or(false)
    }

    /// Name of `group`, if registered.
    #[must_use]
    pub fn group_name(&self, group: GroupId) -> Option<String> {
        self.groups.get(&group).map(|g| g.name.clone())
    }

    /// Number of registered groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Makes every subsequent marker add/remove fail with
    /// [`PlatformError::Unavailable`].
    pub fn fail_marker_updates(&self, fail: bool) {
        self.fail_marker_updates.store(fail, Ordering::SeqCst);
    }

    fn update_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
        add: bool,
    ) -> Result<(), PlatformError> {
        if self.fail_marker_updates.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable(
                "marker updates are disabled".to_string(),
            ));
        }
        let mut g = self
            .groups
            .get_mut(&group)
            .ok_or(PlatformError::UnknownGroup(group))?;
        if !g.roles.iter().any(|(id, _)| *id == marker) {
            return Err(PlatformError::PermissionDenied(format!(
                "role {marker} does not exist in group {group}"
            )));
        }
        let member = g.members.get_mut(&user).ok_or_else(|| {
            PlatformError::PermissionDenied(format!("user {user} is not in group {group}"))
        })?;
        if add {
            member.roles.insert(marker);
        } else {
            member.roles.remove(&marker);
        }
        drop(g);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Directory for MemoryDirectory {
    fn bot_id(&self) -> UserId {
        self.bot.id
    }

    async fn member(&self, group: GroupId, user: UserId) -> Result<Option<Member>, PlatformError> {
        let g = self
            .groups
            .get(&group)
            .ok_or(PlatformError::UnknownGroup(group))?;
        Ok(g.members.get(&user).map(|m| Member::new(user, m.name.clone())))
    }

    async fn find_marker(
        &self,
        group: GroupId,
        name: &str,
    ) -> Result<Option<MarkerId>, PlatformError> {
        let g = self
            .groups
            .get(&group)
            .ok_or(PlatformError::UnknownGroup(group))?;
        Ok(g.roles
            .iter()
            .find(|(_, role)| role.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id))
    }

    async fn has_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
    ) -> Result<bool, PlatformError> {
        if !self.groups.contains_key(&group) {
            return Err(PlatformError::UnknownGroup(group));
        }
        Ok(self.holds(group, user, marker))
    }
}

#[async_trait::async_trait]
impl MarkerApplier for MemoryDirectory {
    async fn add_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
    ) -> Result<(), PlatformError> {
        self.update_marker(group, user, marker, true)
    }

    async fn remove_marker(
        &self,
        group: GroupId,
        user: UserId,
        marker: MarkerId,
    ) -> Result<(), PlatformError> {
        self.update_marker(group, user, marker, false)
    }
}

/// Responder that keeps every reply in memory.
#[derive(Debug, Default)]
pub struct RecordingResponder {
    replies: Mutex<Vec<String>>,
}

impl RecordingResponder {
    /// Creates an empty responder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies recorded so far, oldest first.
    #[must_use]
    pub fn replies(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Responder for RecordingResponder {
    async fn reply(&self, text: &str) -> Result<(), PlatformError> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
