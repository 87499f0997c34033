//! Metrics collection for `skronk`.
//!
//! Prometheus-compatible metrics with label cardinality protection and
//! typed convenience functions for recording measurements. The `metrics`
//! macros no-op until [`init_metrics`] installs a recorder.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::SkronkError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Sanitizes a command name for use as a metrics label.
///
/// Command names arrive from the wire, so anything not in the registry is
/// bucketed as `"__unknown__"`.
#[must_use]
pub fn sanitize_command_label(command: &str) -> &str {
    if crate::commands::find(command).is_some() {
        command
    } else {
        "__unknown__"
    }
}

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `SkronkError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), SkronkError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SkronkError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!(
        "skronk_invocations_total",
        "Total number of command invocations received"
    );
    describe_counter!(
        "skronk_triggers_total",
        "Penalty triggers by outcome (applied, extended, backfired, rejected, failed)"
    );
    describe_counter!(
        "skronk_marker_failures_total",
        "Marker add/remove calls that failed"
    );
    describe_counter!(
        "skronk_errors_total",
        "Total number of errors by category"
    );
    describe_gauge!("skronk_penalties_active", "Active ledger entries");
    describe_gauge!("skronk_watchers_active", "Running expiry watchers");
    describe_histogram!(
        "skronk_penalty_seconds",
        "Penalty total in seconds after each applied trigger"
    );
}

/// Records an incoming command invocation.
pub fn record_invocation(command: &str) {
    let label = sanitize_command_label(command);
    counter!("skronk_invocations_total", "command" => label.to_owned()).increment(1);
}

/// Records the outcome of one penalty trigger.
pub fn record_trigger(outcome: &'static str) {
    counter!("skronk_triggers_total", "outcome" => outcome).increment(1);
}

/// Records a failed marker add or remove.
pub fn record_marker_failure(operation: &'static str) {
    counter!("skronk_marker_failures_total", "operation" => operation).increment(1);
}

/// Records an error by category.
pub fn record_error(category: &'static str) {
    counter!("skronk_errors_total", "category" => category).increment(1);
}

/// Sets the number of active ledger entries.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_penalties(count: usize) {
    gauge!("skronk_penalties_active").set(count as f64);
}

/// Marks an expiry watcher as started.
pub fn watcher_started() {
    gauge!("skronk_watchers_active").increment(1.0);
}

/// Marks an expiry watcher as finished.
pub fn watcher_finished() {
    gauge!("skronk_watchers_active").decrement(1.0);
}

/// Records the penalty total reported to the requester.
#[allow(clippy::cast_precision_loss)]
pub fn record_penalty_seconds(total: u64) {
    histogram!("skronk_penalty_seconds").record(total as f64);
}
