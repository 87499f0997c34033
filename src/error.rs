//! Error types for `skronk`
//!
//! Process-level errors map to exit codes; trigger and command errors are
//! reported back to the requester as a generic failure reply and never
//! crash the process.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::platform::{GroupId, UserId};

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit statuses.
pub struct ExitCode;

impl ExitCode {
    /// Clean shutdown, or a one-shot command that succeeded
    pub const SUCCESS: i32 = 0;

    /// Config file unreadable as YAML, rejected by validation, or
    /// `validate --strict` saw warnings
    pub const CONFIG_ERROR: i32 = 2;

    /// A file named on the command line could not be opened
    pub const IO_ERROR: i32 = 3;

    /// Reading invocations or writing replies failed
    pub const TRANSPORT_ERROR: i32 = 4;

    /// Second SIGINT while shutting down
    pub const INTERRUPTED: i32 = 130;

    /// Second SIGTERM while shutting down
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum SkronkError {
    /// Loading or validating the bot configuration failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Stdio transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Events file or other local I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rendering CLI output failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SkronkError {
    /// Exit status the binary reports for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => ExitCode::CONFIG_ERROR,
            Self::Io(_) | Self::Json(_) => ExitCode::IO_ERROR,
            Self::Transport(_) => ExitCode::TRANSPORT_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Why a configuration file was not loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Not YAML, or YAML that does not fit the schema
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// File being loaded
        path: PathBuf,
        /// 1-based line, when the parser reports one
        line: Option<usize>,
        /// Parser message
        message: String,
    },

    /// Parsed, but the validator found errors
    #[error("validation failed for {path}")]
    ValidationError {
        /// File being loaded
        path: String,
        /// Every error found, in document order
        errors: Vec<ValidationIssue>,
    },

    /// The file does not exist or cannot be read
    #[error("file not found: {path}")]
    MissingFile {
        /// File that was requested
        path: PathBuf,
    },

    /// A loader limit was exceeded
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// What was measured
        field: String,
        /// Observed value
        value: String,
        /// Accepted range
        expected: String,
    },

    /// `${VAR:?message}` referenced an unset variable
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Variable name
        var: String,
        /// File and message from the reference
        location: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// One finding from the config validator.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    /// Field path such as `guilds[0].members[2].id`
    pub path: String,
    /// What is wrong
    pub message: String,
    /// Whether it blocks loading
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{label}: {} at {}", self.message, self.path)
    }
}

/// How serious a [`ValidationIssue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Reported, but the configuration still loads
    Warning,
}

// ============================================================================
// Transport Errors
// ============================================================================

/// NDJSON transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading stdin or writing stdout failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply could not be serialized
    #[error("reply serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Platform Errors
// ============================================================================

/// Failures reported by the external collaborators (directory, marker
/// applier, responder).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The group is not known to the platform
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    /// The platform refused the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The platform could not be reached or failed transiently
    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Trigger Errors
// ============================================================================

/// Reasons a penalty trigger could not be carried out.
///
/// None of these mutate the ledger.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The request did not originate inside a group
    #[error("user {requester} triggered a penalty outside of a group")]
    OutOfScope {
        /// Who sent the request
        requester: UserId,
    },

    /// The group has no role matching the configured marker name
    #[error("marker role '{marker_name}' not found in group {group}")]
    MarkerUnavailable {
        /// Group that was searched
        group: GroupId,
        /// Configured marker role name
        marker_name: String,
    },

    /// Requester or target is not a member of the group
    #[error("user {user} is not a member of group {group}")]
    UnknownMember {
        /// Group that was searched
        group: GroupId,
        /// Missing user
        user: UserId,
    },

    /// A collaborator failed while resolving the trigger
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

// ============================================================================
// Command Errors
// ============================================================================

/// Errors raised while processing a command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No command is registered under this name
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A required option was not supplied
    #[error("missing required option '{0}'")]
    MissingOption(String),

    /// An option value could not be interpreted
    #[error("invalid value for option '{name}': {value}")]
    InvalidOption {
        /// Option name
        name: String,
        /// Offending value, rendered as text
        value: String,
    },

    /// The penalty trigger failed
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// A collaborator failed outside of a trigger
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl CommandError {
    /// Short error name shown to the requester in the generic failure reply.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "UnknownCommandError",
            Self::MissingOption(_) => "MissingOptionError",
            Self::InvalidOption { .. } => "InvalidOptionError",
            Self::Trigger(TriggerError::OutOfScope { .. }) => "OutOfScopeError",
            Self::Trigger(TriggerError::MarkerUnavailable { .. }) => "MarkerUnavailableError",
            Self::Trigger(TriggerError::UnknownMember { .. }) => "UnknownMemberError",
            Self::Trigger(TriggerError::Platform(_)) | Self::Platform(_) => "PlatformError",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_error_class() {
        let config: SkronkError = ConfigError::MissingFile {
            path: PathBuf::from("bot.yaml"),
        }
        .into();
        assert_eq!(config.exit_code(), 2);

        let io: SkronkError = std::io::Error::other("disk full").into();
        assert_eq!(io.exit_code(), 3);

        let transport: SkronkError =
            TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).into();
        assert_eq!(transport.exit_code(), 4);
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "guilds[0].roles".to_string(),
            message: "duplicate role id 10".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: duplicate role id 10 at guilds[0].roles"
        );
    }

    #[test]
    fn test_command_error_kind_names_trigger_failures() {
        let err: CommandError = TriggerError::OutOfScope {
            requester: UserId(1),
        }
        .into();
        assert_eq!(err.kind(), "OutOfScopeError");

        let err: CommandError = TriggerError::MarkerUnavailable {
            group: GroupId(7),
            marker_name: "SKRONK'd".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "MarkerUnavailableError");
        assert!(err.to_string().contains("SKRONK'd"));
    }

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::UnknownGroup(GroupId(42));
        assert_eq!(err.to_string(), "unknown group 42");
    }
}
