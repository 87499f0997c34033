//! Penalty controller.
//!
//! Orchestrates a single trigger: resolve who is involved, refuse penalized
//! requesters, redirect triggers aimed at the bot, merge the timeout into the
//! ledger, apply the marker, reply, and arm a watcher when the penalty is
//! new.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::duration::{format_secs, resolve_timeout};
use super::ledger::PenaltyLedger;
use super::watcher::{ExpiryWatcher, WatchTarget};
use crate::config::schema::{
    DEFAULT_MARKER_NAME, DEFAULT_TIMEOUT_SECS, PenaltyConfig, ReplyTemplates,
};
use crate::error::TriggerError;
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::platform::{Directory, GroupId, MarkerApplier, Member, Responder, UserId};

// ============================================================================
// Request
// ============================================================================

/// One incoming request to penalize a member.
#[derive(Debug, Clone)]
pub struct PenaltyRequest {
    /// Group the request came from; `None` outside of a group
    pub group: Option<GroupId>,
    /// Who issued the trigger
    pub requester: UserId,
    /// Who the trigger is aimed at
    pub target: UserId,
    /// Optional message shown under the penalty line
    pub reason: Option<String>,
    /// Raw timeout option as typed by the requester
    pub timeout_input: Option<String>,
    resolved: OnceLock<u64>,
}

impl PenaltyRequest {
    /// Creates a request with no reason and no explicit timeout.
    #[must_use]
    pub fn new(group: Option<GroupId>, requester: UserId, target: UserId) -> Self {
        Self {
            group,
            requester,
            target,
            reason: None,
            timeout_input: None,
            resolved: OnceLock::new(),
        }
    }

    /// Attaches a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the raw timeout text.
    #[must_use]
    pub fn with_timeout(mut self, input: impl Into<String>) -> Self {
        self.timeout_input = Some(input.into());
        self.resolved = OnceLock::new();
        self
    }

    /// Timeout in seconds for this request.
    ///
    /// Resolved on first call and memoized; later calls return the same
    /// value regardless of `default`.
    pub fn timeout(&self, default: u64) -> u64 {
        *self
            .resolved
            .get_or_init(|| resolve_timeout(self.timeout_input.as_deref(), default))
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Controller settings derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenaltySettings {
    /// Marker role name, matched ignoring ASCII case
    pub marker_name: String,
    /// Fallback timeout in seconds, always > 0
    pub default_timeout: u64,
    /// Reply templates
    pub replies: ReplyTemplates,
}

impl PenaltySettings {
    /// Builds settings from the penalty section and reply templates.
    ///
    /// An unusable `default_timeout` falls back to 60 seconds; the config
    /// validator reports it separately.
    #[must_use]
    pub fn from_config(penalty: &PenaltyConfig, replies: &ReplyTemplates) -> Self {
        Self {
            marker_name: penalty.marker_name.clone(),
            default_timeout: resolve_timeout(
                Some(penalty.default_timeout.as_str()),
                DEFAULT_TIMEOUT_SECS,
            ),
            replies: replies.clone(),
        }
    }
}

impl Default for PenaltySettings {
    fn default() -> Self {
        Self {
            marker_name: DEFAULT_MARKER_NAME.to_string(),
            default_timeout: DEFAULT_TIMEOUT_SECS,
            replies: ReplyTemplates::default(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// A penalty that was started or extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPenalty {
    /// Member who received the penalty
    pub target: Member,
    /// Seconds added by this trigger
    pub added: u64,
    /// Remaining seconds after this trigger
    pub total: u64,
    /// Whether an active penalty was extended
    pub extended: bool,
    /// Whether the trigger was aimed at the bot and landed on the requester
    pub backfire: bool,
    /// Whether the platform accepted the marker
    pub marker_added: bool,
    /// Group whose marker the watcher removes on expiry. Differs from the
    /// trigger's group only when a global ledger shares a penalty across
    /// groups.
    pub released_in: GroupId,
    /// Text sent to the requester
    pub reply: String,
}

/// Result of a trigger that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PenaltyOutcome {
    /// The requester is penalized and may not penalize others.
    Rejected {
        /// The refused requester
        requester: UserId,
        /// Text sent to the requester
        reply: String,
    },
    /// A penalty was applied.
    Applied(AppliedPenalty),
}

impl PenaltyOutcome {
    /// The reply text sent for this outcome.
    #[must_use]
    pub fn reply(&self) -> &str {
        match self {
            Self::Rejected { reply, .. } => reply,
            Self::Applied(applied) => &applied.reply,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Collaborators and settings for a [`PenaltyController`].
pub struct ControllerOptions {
    /// Shared ledger
    pub ledger: Arc<PenaltyLedger>,
    /// Membership and role lookups
    pub directory: Arc<dyn Directory>,
    /// Marker add/remove
    pub applier: Arc<dyn MarkerApplier>,
    /// Marker name, default timeout and reply templates
    pub settings: PenaltySettings,
    /// Structured event sink
    pub events: Arc<EventEmitter>,
    /// Cancelled at process shutdown; abandons running watchers
    pub shutdown: CancellationToken,
}

/// Runs penalty triggers against a shared ledger.
pub struct PenaltyController {
    ledger: Arc<PenaltyLedger>,
    directory: Arc<dyn Directory>,
    applier: Arc<dyn MarkerApplier>,
    settings: PenaltySettings,
    events: Arc<EventEmitter>,
    watchers: TaskTracker,
    shutdown: CancellationToken,
}

impl PenaltyController {
    /// Creates a controller.
    #[must_use]
    pub fn new(opts: ControllerOptions) -> Self {
        Self {
            ledger: opts.ledger,
            directory: opts.directory,
            applier: opts.applier,
            settings: opts.settings,
            events: opts.events,
            watchers: TaskTracker::new(),
            shutdown: opts.shutdown,
        }
    }

    /// The shared ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<PenaltyLedger> {
        &self.ledger
    }

    /// Controller settings.
    #[must_use]
    pub const fn settings(&self) -> &PenaltySettings {
        &self.settings
    }

    /// The event sink shared with watchers.
    #[must_use]
    pub const fn events(&self) -> &Arc<EventEmitter> {
        &self.events
    }

    /// Number of watchers still running.
    #[must_use]
    pub fn active_watchers(&self) -> usize {
        self.watchers.len()
    }

    /// Waits until every watcher has finished.
    ///
    /// Watchers keep being accepted while this waits; it returns once all of
    /// them are released or abandoned.
    pub async fn drain(&self) {
        self.watchers.close();
        self.watchers.wait().await;
    }

    /// Processes one trigger and sends its reply through `responder`.
    ///
    /// # Errors
    ///
    /// Returns a [`TriggerError`] when the trigger cannot be resolved. The
    /// ledger is untouched in that case and no reply has been sent.
    pub async fn trigger(
        &self,
        request: &PenaltyRequest,
        responder: &dyn Responder,
    ) -> Result<PenaltyOutcome, TriggerError> {
        let Some(group) = request.group else {
            warn!(requester = %request.requester, "penalty triggered outside of a group");
            return Err(TriggerError::OutOfScope {
                requester: request.requester,
            });
        };

        let Some(marker) = self
            .directory
            .find_marker(group, &self.settings.marker_name)
            .await?
        else {
            warn!(%group, marker = %self.settings.marker_name, "no marker role in group");
            return Err(TriggerError::MarkerUnavailable {
                group,
                marker_name: self.settings.marker_name.clone(),
            });
        };

        let requester = self.resolve_member(group, request.requester).await?;
        let target = self.resolve_member(group, request.target).await?;
        debug!(%group, requester = %requester.name, target = %target.name, "processing penalty");

        if self.directory.has_marker(group, requester.id, marker).await? {
            info!(%group, requester = %requester.name, "penalized requester tried to trigger");
            let reply = self.settings.replies.rejected.clone();
            self.send(responder, &reply).await;
            metrics::record_trigger("rejected");
            self.events.emit(Event::TriggerRejected {
                timestamp: Utc::now(),
                group,
                requester: requester.id,
            });
            return Ok(PenaltyOutcome::Rejected {
                requester: requester.id,
                reply,
            });
        }

        let backfire = target.id == self.directory.bot_id();
        let (penalized, reason) = if backfire {
            (requester, None)
        } else {
            (target, request.reason.as_deref())
        };

        let added = request.timeout(self.settings.default_timeout);
        let key = self.ledger.key(group, penalized.id);
        let mut marker_owner = self.ledger.lock_marker(key).await;
        let merged = self.ledger.apply_or_extend(key, added);
        if merged.was_active {
            debug!(user = %penalized.name, added, total = merged.total, "extending penalty");
            if let Some(owner) = (*marker_owner).filter(|owner| *owner != group) {
                warn!(
                    %group,
                    %owner,
                    user = %penalized.id,
                    "penalty shared across groups; only the marker in the owning group will be removed"
                );
            }
        } else {
            *marker_owner = Some(group);
        }
        let released_in = (*marker_owner).unwrap_or(group);

        let marker_added = match self.applier.add_marker(group, penalized.id, marker).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%group, user = %penalized.id, error = %e, "failed to add penalty marker");
                metrics::record_marker_failure("add");
                false
            }
        };
        drop(marker_owner);

        let reply = self.render_applied(&penalized, reason, merged.total, backfire);
        self.send(responder, &reply).await;
        info!(
            %group,
            user = %penalized.name,
            total = %format_secs(merged.total),
            backfire,
            "penalty applied"
        );

        metrics::record_trigger(match (backfire, merged.was_active) {
            (true, _) => "backfired",
            (false, true) => "extended",
            (false, false) => "applied",
        });
        metrics::record_penalty_seconds(merged.total);
        self.events.emit(Event::PenaltyApplied {
            timestamp: Utc::now(),
            group,
            requester: request.requester,
            target: penalized.id,
            added_secs: added,
            total_secs: merged.total,
            extended: merged.was_active,
            backfire,
        });

        if merged.was_active {
            debug!(user = %penalized.name, "watcher already running");
        } else {
            let watcher = ExpiryWatcher::new(
                WatchTarget {
                    key,
                    group,
                    user: penalized.id,
                    marker,
                },
                Arc::clone(&self.ledger),
                Arc::clone(&self.applier),
                Arc::clone(&self.events),
                self.shutdown.clone(),
            );
            self.watchers.spawn(watcher.run(added));
        }

        Ok(PenaltyOutcome::Applied(AppliedPenalty {
            target: penalized,
            added,
            total: merged.total,
            extended: merged.was_active,
            backfire,
            marker_added,
            released_in,
            reply,
        }))
    }

    async fn resolve_member(&self, group: GroupId, user: UserId) -> Result<Member, TriggerError> {
        self.directory
            .member(group, user)
            .await?
            .ok_or(TriggerError::UnknownMember { group, user })
    }

    async fn send(&self, responder: &dyn Responder, text: &str) {
        if let Err(e) = responder.reply(text).await {
            warn!(error = %e, "failed to deliver reply");
            metrics::record_error("reply");
        }
    }

    fn render_applied(
        &self,
        member: &Member,
        reason: Option<&str>,
        total: u64,
        backfire: bool,
    ) -> String {
        let replies = &self.settings.replies;
        let header = if backfire {
            &replies.backfire
        } else {
            &replies.penalized
        };
        let mut lines = vec![header.replace("{mention}", &member.mention())];
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            lines.push(reason.to_string());
        }
        lines.push(replies.countdown.replace("{duration}", &format_secs(total)));
        lines.join("\n")
    }
}

impl std::fmt::Debug for PenaltyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PenaltyController")
            .field("settings", &self.settings)
            .field("active_penalties", &self.ledger.len())
            .field("active_watchers", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::config::schema::LedgerScope;
    use crate::platform::{MarkerId, MemoryDirectory, RecordingResponder};

    const GUILD: GroupId = GroupId(1);
    const MARKER: MarkerId = MarkerId(10);
    const BOT: UserId = UserId(900);
    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);

    fn setup(role_name: &str, marker_name: &str) -> (PenaltyController, Arc<MemoryDirectory>) {
        let directory = MemoryDirectory::new(Member::new(BOT, "weezing"));
        directory.add_group(GUILD, "the-boys");
        directory.add_role(GUILD, MARKER, role_name);
        directory.add_member(GUILD, Member::new(ALICE, "alice"));
        directory.add_member(GUILD, Member::new(BOB, "bob"));
        let directory = Arc::new(directory);
        let controller = PenaltyController::new(ControllerOptions {
            ledger: Arc::new(PenaltyLedger::new(LedgerScope::PerGroup)),
            directory: Arc::clone(&directory) as Arc<dyn Directory>,
            applier: Arc::clone(&directory) as Arc<dyn MarkerApplier>,
            settings: PenaltySettings {
                marker_name: marker_name.to_string(),
                ..PenaltySettings::default()
            },
            events: Arc::new(EventEmitter::noop()),
            shutdown: CancellationToken::new(),
        });
        (controller, directory)
    }

    fn applied(outcome: PenaltyOutcome) -> AppliedPenalty {
        match outcome {
            PenaltyOutcome::Applied(applied) => applied,
            PenaltyOutcome::Rejected { .. } => panic!("expected an applied penalty"),
        }
    }

    #[test]
    fn request_timeout_is_memoized() {
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB).with_timeout("2m");
        assert_eq!(request.timeout(60), 120);
        assert_eq!(request.timeout(60), 120);
        assert_eq!(request.timeout(5), 120);
    }

    #[test]
    fn request_without_timeout_uses_default() {
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB);
        assert_eq!(request.timeout(60), 60);
    }

    #[test]
    fn settings_fall_back_on_bad_default_timeout() {
        let penalty = PenaltyConfig {
            default_timeout: "soon".to_string(),
            ..PenaltyConfig::default()
        };
        let settings = PenaltySettings::from_config(&penalty, &ReplyTemplates::default());
        assert_eq!(settings.default_timeout, DEFAULT_TIMEOUT_SECS);

        let penalty = PenaltyConfig {
            default_timeout: "5m".to_string(),
            ..PenaltyConfig::default()
        };
        let settings = PenaltySettings::from_config(&penalty, &ReplyTemplates::default());
        assert_eq!(settings.default_timeout, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_penalize_then_release() {
        let (controller, directory) = setup("PENALIZED", "penalized");
        let responder = RecordingResponder::new();
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB).with_timeout("10s");
        let start = Instant::now();

        let outcome = applied(controller.trigger(&request, &responder).await.unwrap());

        let key = controller.ledger().key(GUILD, BOB);
        assert_eq!(controller.ledger().remaining(key), Some(10));
        assert_eq!(controller.ledger().len(), 1);
        assert!(directory.holds(GUILD, BOB, MARKER));
        assert!(outcome.marker_added);
        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("10s"));
        assert!(replies[0].contains(&BOB.mention()));
        assert_eq!(controller.active_watchers(), 1);

        controller.drain().await;

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(controller.ledger().is_empty());
        assert!(!directory.holds(GUILD, BOB, MARKER));
    }

    #[tokio::test(start_paused = true)]
    async fn reason_is_shown_between_header_and_countdown() {
        let (controller, _directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        let responder = RecordingResponder::new();
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB)
            .with_reason("for crimes")
            .with_timeout("90");

        let outcome = controller.trigger(&request, &responder).await.unwrap();

        assert_eq!(
            outcome.reply(),
            "GET SKRONK'D <@2>\nfor crimes\n(See you in 1m 30s)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_against_bot_backfires_on_requester() {
        let (controller, directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        let responder = RecordingResponder::new();
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOT)
            .with_reason("ignored")
            .with_timeout("30s");

        let outcome = applied(controller.trigger(&request, &responder).await.unwrap());

        assert!(outcome.backfire);
        assert_eq!(outcome.target.id, ALICE);
        assert!(directory.holds(GUILD, ALICE, MARKER));
        assert!(!directory.holds(GUILD, BOT, MARKER));
        assert!(!controller.ledger().is_active(controller.ledger().key(GUILD, BOT)));
        assert_eq!(outcome.reply, "YA TRYNA SKRONK ME?!? <@1>\n(See you in 30s)");
    }

    #[tokio::test(start_paused = true)]
    async fn penalized_requester_is_rejected() {
        let (controller, directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        directory.grant_role(GUILD, ALICE, MARKER);
        let responder = RecordingResponder::new();
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB);

        let outcome = controller.trigger(&request, &responder).await.unwrap();

        assert_eq!(
            outcome,
            PenaltyOutcome::Rejected {
                requester: ALICE,
                reply: "Can't skronk if you're skronk'd!".to_string(),
            }
        );
        assert!(controller.ledger().is_empty());
        assert!(!directory.holds(GUILD, BOB, MARKER));
        assert_eq!(controller.active_watchers(), 0);
        assert_eq!(responder.replies(), vec!["Can't skronk if you're skronk'd!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn penalized_requester_cannot_backfire_either() {
        let (controller, directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        directory.grant_role(GUILD, ALICE, MARKER);
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOT);

        let outcome = controller
            .trigger(&request, &RecordingResponder::new())
            .await
            .unwrap();

        assert!(matches!(outcome, PenaltyOutcome::Rejected { .. }));
        assert!(controller.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_triggers_extend_with_one_watcher() {
        let (controller, _directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        let responder = RecordingResponder::new();
        let start = Instant::now();

        for _ in 0..3 {
            let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB).with_timeout("10s");
            controller.trigger(&request, &responder).await.unwrap();
        }

        let key = controller.ledger().key(GUILD, BOB);
        assert_eq!(controller.ledger().remaining(key), Some(30));
        assert_eq!(controller.active_watchers(), 1);
        assert!(responder.replies()[2].ends_with("(See you in 30s)"));

        controller.drain().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn marker_failure_keeps_ledger_and_still_releases() {
        let (controller, directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        directory.fail_marker_updates(true);
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB).with_timeout("5s");

        let outcome = applied(
            controller
                .trigger(&request, &RecordingResponder::new())
                .await
                .unwrap(),
        );

        assert!(!outcome.marker_added);
        assert!(controller.ledger().is_active(controller.ledger().key(GUILD, BOB)));
        controller.drain().await;
        assert!(controller.ledger().is_empty());
    }

    #[tokio::test]
    async fn missing_group_is_out_of_scope() {
        let (controller, _directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        let responder = RecordingResponder::new();
        let request = PenaltyRequest::new(None, ALICE, BOB);

        let err = controller.trigger(&request, &responder).await.unwrap_err();

        assert!(matches!(err, TriggerError::OutOfScope { requester } if requester == ALICE));
        assert!(controller.ledger().is_empty());
        assert!(responder.replies().is_empty());
    }

    #[tokio::test]
    async fn missing_marker_role_is_reported() {
        let (controller, _directory) = setup("muted", DEFAULT_MARKER_NAME);
        let request = PenaltyRequest::new(Some(GUILD), ALICE, BOB);

        let err = controller
            .trigger(&request, &RecordingResponder::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TriggerError::MarkerUnavailable { .. }));
        assert!(controller.ledger().is_empty());
    }

    #[tokio::test]
    async fn unknown_target_is_reported() {
        let (controller, _directory) = setup("SKRONK'd", DEFAULT_MARKER_NAME);
        let request = PenaltyRequest::new(Some(GUILD), ALICE, UserId(77));

        let err = controller
            .trigger(&request, &RecordingResponder::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TriggerError::UnknownMember { user, .. } if user == UserId(77)
        ));
        assert!(controller.ledger().is_empty());
    }
}
