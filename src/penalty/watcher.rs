//! Expiry watcher.
//!
//! One watcher runs per active ledger entry. It sleeps, ticks the ledger by
//! the time it slept, and either re-arms with whatever the ledger says is
//! left or removes the marker once nothing remains. Extensions made while it
//! sleeps are therefore picked up on the next tick. A trigger arriving while
//! the marker is being removed waits for the removal and then starts a fresh
//! penalty.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::{PenaltyKey, PenaltyLedger};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::platform::{GroupId, MarkerApplier, MarkerId, UserId};

/// Watcher lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Sleeping for `sleep_secs` before the next tick.
    Armed {
        /// Seconds until the next tick
        sleep_secs: u64,
    },
    /// The ledger entry expired and marker removal was attempted.
    Released {
        /// Whether the platform accepted the removal
        marker_removed: bool,
    },
    /// Shutdown interrupted the watcher; the marker stays in place.
    Abandoned,
}

impl WatcherState {
    /// Whether the watcher has stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Armed { .. })
    }
}

/// The penalized member a watcher is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTarget {
    /// Ledger key of the penalty
    pub key: PenaltyKey,
    /// Group the marker lives in
    pub group: GroupId,
    /// Penalized user
    pub user: UserId,
    /// Marker role to remove on expiry
    pub marker: MarkerId,
}

/// Drives one penalty from its first sleep to release.
pub struct ExpiryWatcher {
    target: WatchTarget,
    ledger: Arc<PenaltyLedger>,
    applier: Arc<dyn MarkerApplier>,
    events: Arc<EventEmitter>,
    shutdown: CancellationToken,
}

impl ExpiryWatcher {
    /// Creates a watcher for `target`.
    #[must_use]
    pub fn new(
        target: WatchTarget,
        ledger: Arc<PenaltyLedger>,
        applier: Arc<dyn MarkerApplier>,
        events: Arc<EventEmitter>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            target,
            ledger,
            applier,
            events,
            shutdown,
        }
    }

    /// Runs until the penalty is released or shutdown is requested.
    ///
    /// `initial_secs` is the first sleep, normally the timeout that created
    /// the ledger entry.
    pub async fn run(self, initial_secs: u64) -> WatcherState {
        metrics::watcher_started();
        let mut state = WatcherState::Armed {
            sleep_secs: initial_secs,
        };
        let terminal = loop {
            state = match state {
                WatcherState::Armed { sleep_secs } => self.step(sleep_secs).await,
                terminal => break terminal,
            };
        };
        metrics::watcher_finished();
        terminal
    }

    async fn step(&self, sleep_secs: u64) -> WatcherState {
        debug!(user = %self.target.user, sleep_secs, "watcher sleeping");
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => self.abandon(),
            () = tokio::time::sleep(Duration::from_secs(sleep_secs)) => self.tick(sleep_secs).await,
        }
    }

    async fn tick(&self, slept: u64) -> WatcherState {
        let guard = self.ledger.lock_marker(self.target.key).await;
        let tick = self.ledger.tick_and_check(self.target.key, slept);
        if !tick.expired {
            debug!(
                user = %self.target.user,
                remaining = tick.remaining,
                "penalty extended while sleeping, re-arming"
            );
            return WatcherState::Armed {
                sleep_secs: tick.remaining,
            };
        }

        let WatchTarget {
            group,
            user,
            marker,
            ..
        } = self.target;
        let marker_removed = match self.applier.remove_marker(group, user, marker).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%group, %user, error = %e, "failed to remove penalty marker");
                metrics::record_marker_failure("remove");
                false
            }
        };
        self.ledger.release_marker(self.target.key, guard);
        info!(%group, %user, "penalty released");
        self.events.emit(Event::PenaltyReleased {
            timestamp: Utc::now(),
            group,
            user,
            marker_removed,
        });
        WatcherState::Released { marker_removed }
    }

    fn abandon(&self) -> WatcherState {
        debug!(user = %self.target.user, "shutdown requested, abandoning watcher");
        self.events.emit(Event::WatcherAbandoned {
            timestamp: Utc::now(),
            group: self.target.group,
            user: self.target.user,
        });
        WatcherState::Abandoned
    }
}
