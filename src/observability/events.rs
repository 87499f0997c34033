//! Structured event stream for `skronk`.
//!
//! Discrete, typed events emitted while the bot runs. Events are serialized
//! as newline-delimited JSON (JSONL) with a monotonically increasing sequence
//! number for ordering.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::platform::{GroupId, UserId};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during operation.
///
/// Each variant is tagged with `"type"` when serialized to JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The bot is ready to accept invocations.
    ServiceStarted {
        /// When the bot started.
        timestamp: DateTime<Utc>,
        /// Bot display name.
        bot_name: String,
        /// Number of groups served.
        groups: usize,
    },

    /// The bot has stopped accepting invocations.
    ServiceStopped {
        /// When the bot stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable stop reason.
        reason: String,
        /// Penalties still active at shutdown.
        active_penalties: usize,
    },

    /// A penalty was started or extended.
    PenaltyApplied {
        /// When the penalty was applied.
        timestamp: DateTime<Utc>,
        /// Group the penalty belongs to.
        group: GroupId,
        /// Who triggered it.
        requester: UserId,
        /// Who received it.
        target: UserId,
        /// Seconds added by this trigger.
        added_secs: u64,
        /// Remaining seconds after this trigger.
        total_secs: u64,
        /// Whether an active penalty was extended.
        extended: bool,
        /// Whether the trigger targeted the bot and landed on the requester.
        backfire: bool,
    },

    /// A penalty ran out and its watcher released the member.
    PenaltyReleased {
        /// When the watcher released.
        timestamp: DateTime<Utc>,
        /// Group the penalty belonged to.
        group: GroupId,
        /// Released user.
        user: UserId,
        /// Whether the marker removal call succeeded.
        marker_removed: bool,
    },

    /// A watcher stopped because the bot is shutting down.
    WatcherAbandoned {
        /// When the watcher stopped.
        timestamp: DateTime<Utc>,
        /// Group the penalty belongs to.
        group: GroupId,
        /// User left holding the marker.
        user: UserId,
    },

    /// A penalized requester tried to trigger a penalty.
    TriggerRejected {
        /// When the trigger was rejected.
        timestamp: DateTime<Utc>,
        /// Group of the request.
        group: GroupId,
        /// Rejected requester.
        requester: UserId,
    },

    /// An invocation failed and got the generic failure reply.
    TriggerFailed {
        /// When the failure was reported.
        timestamp: DateTime<Utc>,
        /// Invocation id.
        invocation_id: String,
        /// Error kind shown to the requester.
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// One JSONL line: the event's own fields plus its position in the stream.
#[derive(Serialize)]
struct Line<'a> {
    sequence: u64,
    #[serde(flatten)]
    event: &'a Event,
}

/// Writer plus the sequence number of the next line. Kept under one lock so
/// line order in the file always matches sequence order.
struct Stream {
    out: BufWriter<Box<dyn Write + Send>>,
    next: u64,
}

/// JSONL event sink shared by the controller, watchers and adapter.
///
/// Every line is flushed as soon as it is written. Serialization and I/O
/// failures are dropped so a full disk never stops a penalty.
pub struct EventEmitter {
    stream: Mutex<Stream>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("events", &self.event_count())
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Emitter writing to `writer`.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            stream: Mutex::new(Stream {
                out: BufWriter::new(writer),
                next: 0,
            }),
        }
    }

    /// Emitter that counts events and writes nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Emitter that truncates and writes `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(Box::new(std::fs::File::create(path)?)))
    }

    /// Appends `event` to the stream.
    pub fn emit(&self, event: Event) {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let line = Line {
            sequence: stream.next,
            event: &event,
        };
        stream.next += 1;
        if let Ok(json) = serde_json::to_string(&line) {
            let _ = writeln!(stream.out, "{json}").and_then(|()| stream.out.flush());
        }
    }

    /// Events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::noop()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
