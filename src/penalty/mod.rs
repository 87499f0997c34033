//! Penalty timeout engine.
//!
//! - [`duration`]: turns the requester's timeout text into seconds
//! - [`ledger`]: remaining seconds per penalized identity
//! - [`watcher`]: per-penalty expiry loop
//! - [`controller`]: runs one trigger end to end

pub mod controller;
pub mod duration;
pub mod ledger;
pub mod watcher;

pub use controller::{
    AppliedPenalty, ControllerOptions, PenaltyController, PenaltyOutcome, PenaltyRequest,
    PenaltySettings,
};
pub use duration::{format_secs, resolve_timeout};
pub use ledger::{ApplyOutcome, PenaltyKey, PenaltyLedger, TickOutcome};
pub use watcher::{ExpiryWatcher, WatchTarget, WatcherState};
