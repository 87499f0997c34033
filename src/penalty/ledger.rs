//! Penalty ledger.
//!
//! Remaining penalty seconds per identity. An entry exists exactly while a
//! penalty is active for its key.
//!
//! Each operation checks and mutates an entry while holding the entry's
//! shard lock (`DashMap` entry API), so two triggers racing on the same key
//! cannot both observe "not active" and both arm a watcher. Shard locks are
//! never held across an `.await`.
//!
//! Marker changes go through a separate per-key async lock. The controller
//! holds it from `apply_or_extend` until the marker is added, and the watcher
//! holds it from the expiring tick until the marker is removed, so a release
//! in flight can never strip the marker of a penalty that started after it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::schema::LedgerScope;
use crate::observability::metrics;
use crate::platform::{GroupId, UserId};

/// Ledger key.
///
/// `group` is `None` when the ledger runs with [`LedgerScope::Global`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PenaltyKey {
    /// Group the penalty belongs to, if groups are isolated
    pub group: Option<GroupId>,
    /// Penalized user
    pub user: UserId,
}

/// Result of [`PenaltyLedger::apply_or_extend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Remaining seconds after the call
    pub total: u64,
    /// Whether an entry already existed, meaning a watcher already owns it
    pub was_active: bool,
}

/// Result of [`PenaltyLedger::tick_and_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Remaining seconds after the tick (0 once expired)
    pub remaining: u64,
    /// Whether the entry was removed by this tick
    pub expired: bool,
}

/// Exclusive right to change the marker for one key.
///
/// Holds the group whose marker the running watcher will remove, or `None`
/// when no penalty has been marked.
pub type MarkerGuard = OwnedMutexGuard<Option<GroupId>>;

/// Mapping from identity to remaining penalty seconds.
#[derive(Debug, Default)]
pub struct PenaltyLedger {
    entries: DashMap<PenaltyKey, u64>,
    markers: DashMap<PenaltyKey, Arc<Mutex<Option<GroupId>>>>,
    scope: LedgerScope,
}

impl PenaltyLedger {
    /// Creates an empty ledger with the given keying scope.
    #[must_use]
    pub fn new(scope: LedgerScope) -> Self {
        Self {
            entries: DashMap::new(),
            markers: DashMap::new(),
            scope,
        }
    }

    /// Returns the keying scope.
    #[must_use]
    pub const fn scope(&self) -> LedgerScope {
        self.scope
    }

    /// Builds the key for `user` in `group` under this ledger's scope.
    #[must_use]
    pub const fn key(&self, group: GroupId, user: UserId) -> PenaltyKey {
        match self.scope {
            LedgerScope::Global => PenaltyKey { group: None, user },
            LedgerScope::PerGroup => PenaltyKey {
                group: Some(group),
                user,
            },
        }
    }

    /// Starts a penalty of `additional` seconds, or adds them to the
    /// remaining time of an active one.
    pub fn apply_or_extend(&self, key: PenaltyKey, additional: u64) -> ApplyOutcome {
        let outcome = match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                let total = entry.get().saturating_add(additional);
                *entry.get_mut() = total;
                ApplyOutcome {
                    total,
                    was_active: true,
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(additional);
                ApplyOutcome {
                    total: additional,
                    was_active: false,
                }
            }
        };
        metrics::set_active_penalties(self.entries.len());
        outcome
    }

    /// Subtracts `elapsed` seconds, removing the entry once nothing remains.
    ///
    /// A missing entry counts as zero and reports `expired`.
    pub fn tick_and_check(&self, key: PenaltyKey, elapsed: u64) -> TickOutcome {
        let outcome = match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                let remaining = entry.get().saturating_sub(elapsed);
                if remaining == 0 {
                    entry.remove();
                    TickOutcome {
                        remaining: 0,
                        expired: true,
                    }
                } else {
                    *entry.get_mut() = remaining;
                    TickOutcome {
                        remaining,
                        expired: false,
                    }
                }
            }
            Entry::Vacant(_) => TickOutcome {
                remaining: 0,
                expired: true,
            },
        };
        metrics::set_active_penalties(self.entries.len());
        outcome
    }

    /// Waits for the marker lock of `key`.
    pub async fn lock_marker(&self, key: PenaltyKey) -> MarkerGuard {
        let slot = Arc::clone(self.markers.entry(key).or_default().value());
        slot.lock_owned().await
    }

    /// Clears the marker owner of a released key and drops the lock slot when
    /// nobody else is waiting on it.
    pub fn release_marker(&self, key: PenaltyKey, mut guard: MarkerGuard) {
        *guard = None;
        // One reference in the map, one in the guard.
        self.markers.remove_if(&key, |_, slot| Arc::strong_count(slot) <= 2);
        drop(guard);
    }

    /// Remaining seconds for `key`, or `None` when not penalized.
    #[must_use]
    pub fn remaining(&self, key: PenaltyKey) -> Option<u64> {
        self.entries.get(&key).map(|v| *v)
    }

    /// Whether `key` is currently penalized.
    #[must_use]
    pub fn is_active(&self, key: PenaltyKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of active penalties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no penalty is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    const GUILD: GroupId = GroupId(1);

    fn ledger() -> PenaltyLedger {
        PenaltyLedger::new(LedgerScope::PerGroup)
    }

    #[test]
    fn first_apply_creates_entry() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        let outcome = ledger.apply_or_extend(key, 10);
        assert_eq!(
            outcome,
            ApplyOutcome {
                total: 10,
                was_active: false
            }
        );
        assert_eq!(ledger.remaining(key), Some(10));
    }

    #[test]
    fn reapply_extends_existing_entry() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        ledger.apply_or_extend(key, 10);
        let outcome = ledger.apply_or_extend(key, 5);
        assert_eq!(outcome.total, 15);
        assert!(outcome.was_active);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn tick_to_zero_expires_and_removes() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        ledger.apply_or_extend(key, 10);
        let tick = ledger.tick_and_check(key, 10);
        assert_eq!(
            tick,
            TickOutcome {
                remaining: 0,
                expired: true
            }
        );
        assert!(!ledger.is_active(key));
        assert!(ledger.is_empty());
    }

    #[test]
    fn extension_between_ticks_is_observed() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        ledger.apply_or_extend(key, 10);
        assert_eq!(
            ledger.tick_and_check(key, 5),
            TickOutcome {
                remaining: 5,
                expired: false
            }
        );
        assert_eq!(ledger.apply_or_extend(key, 10).total, 15);
        assert_eq!(
            ledger.tick_and_check(key, 15),
            TickOutcome {
                remaining: 0,
                expired: true
            }
        );
    }

    #[test]
    fn overshooting_tick_expires() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        ledger.apply_or_extend(key, 3);
        assert!(ledger.tick_and_check(key, 60).expired);
    }

    #[test]
    fn tick_on_missing_entry_reports_expired() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        assert!(ledger.tick_and_check(key, 1).expired);
        assert!(ledger.is_empty());
    }

    #[test]
    fn per_group_scope_isolates_groups() {
        let ledger = ledger();
        let a = ledger.key(GroupId(1), UserId(2));
        let b = ledger.key(GroupId(3), UserId(2));
        assert_ne!(a, b);
        ledger.apply_or_extend(a, 10);
        assert!(!ledger.apply_or_extend(b, 10).was_active);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn global_scope_shares_entries_across_groups() {
        let ledger = PenaltyLedger::new(LedgerScope::Global);
        let a = ledger.key(GroupId(1), UserId(2));
        let b = ledger.key(GroupId(3), UserId(2));
        assert_eq!(a, b);
        ledger.apply_or_extend(a, 10);
        let outcome = ledger.apply_or_extend(b, 10);
        assert!(outcome.was_active);
        assert_eq!(outcome.total, 20);
    }

    #[test]
    fn extension_saturates() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        ledger.apply_or_extend(key, u64::MAX);
        assert_eq!(ledger.apply_or_extend(key, 1).total, u64::MAX);
    }

    #[test]
    fn concurrent_applies_report_exactly_one_fresh_entry() {
        let ledger = Arc::new(ledger());
        let key = ledger.key(GUILD, UserId(2));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.apply_or_extend(key, 5))
            })
            .collect();
        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| !o.was_active)
            .count();
        assert_eq!(fresh, 1);
        assert_eq!(ledger.remaining(key), Some(80));
    }

    #[tokio::test(start_paused = true)]
    async fn marker_lock_is_exclusive_per_key() {
        let ledger = Arc::new(ledger());
        let key = ledger.key(GUILD, UserId(2));
        let other = ledger.key(GUILD, UserId(3));

        let mut held = ledger.lock_marker(key).await;
        *held = Some(GUILD);
        let _unrelated = ledger.lock_marker(other).await;

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { *ledger.lock_marker(key).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), Some(GUILD));
    }

    #[tokio::test]
    async fn release_clears_owner_and_slot() {
        let ledger = ledger();
        let key = ledger.key(GUILD, UserId(2));
        let mut guard = ledger.lock_marker(key).await;
        *guard = Some(GUILD);
        ledger.release_marker(key, guard);
        assert!(ledger.markers.is_empty());
        assert_eq!(*ledger.lock_marker(key).await, None);
    }

    proptest! {
        #[test]
        fn repeated_applies_sum_and_start_once(durations in proptest::collection::vec(1u64..10_000, 1..50)) {
            let ledger = ledger();
            let key = ledger.key(GUILD, UserId(2));
            let fresh = durations
                .iter()
                .map(|d| ledger.apply_or_extend(key, *d))
                .filter(|o| !o.was_active)
                .count();
            prop_assert_eq!(fresh, 1);
            prop_assert_eq!(ledger.remaining(key), Some(durations.iter().sum::<u64>()));
        }
    }
}
