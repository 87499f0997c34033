//! Transport layer.
//!
//! A [`Transport`] yields command invocations and carries replies back.
//! The only implementation is NDJSON over stdin/stdout ([`stdio`]).

pub mod stdio;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use stdio::{NdjsonTransport, StdioConfig, StdioTransport};

use crate::commands::Invocation;
use crate::error::{PlatformError, TransportError};
use crate::platform::{GroupId, Responder, UserId};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Default maximum inbound line size in bytes (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default I/O buffer size in bytes (8 KiB).
pub const DEFAULT_STDIO_BUFFER_SIZE: usize = 8 * 1024;

// ============================================================================
// Wire types
// ============================================================================

/// Inbound invocation as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundInvocation {
    /// Correlation id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Command name
    pub command: String,
    /// Group the command was issued in
    #[serde(default)]
    pub guild_id: Option<GroupId>,
    /// Issuing user
    pub user_id: UserId,
    /// Option values
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl From<InboundInvocation> for Invocation {
    fn from(wire: InboundInvocation) -> Self {
        Self {
            id: wire
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            command: wire.command,
            group: wire.guild_id,
            user: wire.user_id,
            options: wire.options,
        }
    }
}

/// Outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    /// Id of the invocation being answered
    pub id: String,
    /// Reply text
    pub reply: String,
}

// ============================================================================
// Transport trait
// ============================================================================

/// Source of invocations and sink for replies.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Waits for the next invocation. `Ok(None)` means end of input.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the underlying reader fails. Malformed
    /// messages are skipped, not reported.
    async fn receive(&self) -> Result<Option<InboundInvocation>>;

    /// Writes one reply.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    async fn send(&self, reply: &OutboundReply) -> Result<()>;
}

/// Replies to one invocation over a shared transport.
pub struct TransportResponder {
    transport: Arc<dyn Transport>,
    id: String,
}

impl TransportResponder {
    /// Creates a responder answering invocation `id`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, id: impl Into<String>) -> Self {
        Self {
            transport,
            id: id.into(),
        }
    }
}

#[async_trait::async_trait]
impl Responder for TransportResponder {
    async fn reply(&self, text: &str) -> std::result::Result<(), PlatformError> {
        let reply = OutboundReply {
            id: self.id.clone(),
            reply: text.to_string(),
        };
        self.transport
            .send(&reply)
            .await
            .map_err(|e| PlatformError::Unavailable(e.to_string()))
    }
}
