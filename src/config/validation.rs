//! Configuration validation
//!
//! Semantic checks on a deserialized [`BotConfig`]. Validation collects ALL
//! issues rather than stopping at the first, so `skronk validate` can report
//! everything wrong with a file in one pass.

use std::collections::HashSet;

use crate::config::schema::{BotConfig, GuildConfig, ReplyTemplates};
use crate::error::{Severity, ValidationIssue};
use crate::penalty::duration::parse_timeout;

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &BotConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_bot(config);
        self.validate_penalty(config);
        self.validate_replies(&config.replies);
        self.validate_guilds(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_bot(&mut self, config: &BotConfig) {
        if config.bot.name.trim().is_empty() {
            self.add_error("bot.name", "Bot name is required and cannot be empty");
        }
    }

    fn validate_penalty(&mut self, config: &BotConfig) {
        if config.penalty.marker_name.trim().is_empty() {
            self.add_error("penalty.marker_name", "Marker role name cannot be empty");
        }
        if parse_timeout(&config.penalty.default_timeout).is_none() {
            self.add_error(
                "penalty.default_timeout",
                &format!(
                    "Invalid default timeout '{}': expected a positive duration such as '60s', '5m' or 'PT1M'",
                    config.penalty.default_timeout
                ),
            );
        }
    }

    fn validate_replies(&mut self, replies: &ReplyTemplates) {
        let placeholders = [
            ("replies.penalized", &replies.penalized, "{mention}"),
            ("replies.backfire", &replies.backfire, "{mention}"),
            ("replies.countdown", &replies.countdown, "{duration}"),
            ("replies.failure", &replies.failure, "{error}"),
        ];
        for (path, template, placeholder) in placeholders {
            if !template.contains(placeholder) {
                self.add_warning(
                    path,
                    &format!("Template does not use the {placeholder} placeholder"),
                );
            }
        }
        if replies.rejected.trim().is_empty() {
            self.add_error("replies.rejected", "Rejection reply cannot be empty");
        }
    }

    fn validate_guilds(&mut self, config: &BotConfig) {
        if config.guilds.is_empty() {
            self.add_warning("guilds", "No guilds configured; every invocation will fail");
        }

        let mut guild_ids = HashSet::new();
        for (i, guild) in config.guilds.iter().enumerate() {
            let path = format!("guilds[{i}]");
            if !guild_ids.insert(guild.id) {
                self.add_error(
                    &format!("{path}.id"),
                    &format!("Duplicate guild id {}", guild.id),
                );
            }
            if guild.name.trim().is_empty() {
                self.add_error(&format!("{path}.name"), "Guild name cannot be empty");
            }
            self.validate_guild(config, guild, &path);
        }
    }

    fn validate_guild(&mut self, config: &BotConfig, guild: &GuildConfig, path: &str) {
        let mut role_ids = HashSet::new();
        for (j, role) in guild.roles.iter().enumerate() {
            if !role_ids.insert(role.id) {
                self.add_error(
                    &format!("{path}.roles[{j}].id"),
                    &format!("Duplicate role id {}", role.id),
                );
            }
            if role.name.trim().is_empty() {
                self.add_error(&format!("{path}.roles[{j}].name"), "Role name cannot be empty");
            }
        }

        let marker_name = &config.penalty.marker_name;
        if !guild
            .roles
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(marker_name))
        {
            self.add_warning(
                &format!("{path}.roles"),
                &format!("No role named '{marker_name}'; /skronk will fail in this guild"),
            );
        }

        let mut member_ids = HashSet::new();
        for (j, member) in guild.members.iter().enumerate() {
            let member_path = format!("{path}.members[{j}]");
            if member.id == config.bot.id {
                self.add_error(
                    &format!("{member_path}.id"),
                    "The bot joins every guild automatically and cannot be listed as a member",
                );
            }
            if !member_ids.insert(member.id) {
                self.add_error(
                    &format!("{member_path}.id"),
                    &format!("Duplicate member id {}", member.id),
                );
            }
            if member.name.trim().is_empty() {
                self.add_error(&format!("{member_path}.name"), "Member name cannot be empty");
            }
            for (k, role) in member.roles.iter().enumerate() {
                if !role_ids.contains(role) {
                    self.add_error(
                        &format!("{member_path}.roles[{k}]"),
                        &format!("Unknown role id {role}"),
                    );
                }
            }
        }
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
