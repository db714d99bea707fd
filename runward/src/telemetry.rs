//! Tracing and telemetry instrumentation for runward.
//!
//! Span constructors for the three long-running operations (launch, monitor,
//! recovery) and `record_*` helpers that log a lifecycle fact and, with the
//! `metrics` feature, update the matching Prometheus series.
//!
//! # Example
//!
//! ```ignore
//! use runward::telemetry::{instrument_monitor, record_run_finalized};
//!
//! instrument_monitor(run_id.as_str(), false, async move {
//!     // await the job, write the run
//!     record_run_finalized(run_id.as_str(), "1", "COMPLETED");
//! })
//! .await;
//! ```

use std::future::Future;
use tracing::{info_span, Instrument, Span};

/// Create a tracing span for a launch.
#[must_use]
pub fn run_launch_span(workflow: impl AsRef<str>) -> Span {
    info_span!(
        "runward.launch",
        workflow = %workflow.as_ref(),
        run_id = tracing::field::Empty,
    )
}

/// Create a tracing span for a job monitor.
///
/// # Arguments
/// * `run_id` - The run being monitored
/// * `recovered` - Whether the monitor was attached by the recovery scan
#[must_use]
pub fn run_monitor_span(run_id: impl AsRef<str>, recovered: bool) -> Span {
    info_span!(
        "runward.monitor",
        run_id = %run_id.as_ref(),
        recovered = recovered,
    )
}

/// Create a tracing span for the startup recovery scan.
#[must_use]
pub fn recovery_span() -> Span {
    info_span!("runward.recover")
}

/// Instrument a future with a monitor span.
pub fn instrument_monitor<F>(
    run_id: impl AsRef<str>,
    recovered: bool,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(run_monitor_span(run_id, recovered))
}

/// Record a successful launch.
pub fn record_run_launched(run_id: impl AsRef<str>, workflow: impl AsRef<str>) {
    tracing::info!(
        run_id = %run_id.as_ref(),
        workflow = %workflow.as_ref(),
        "run launched"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_launched(workflow.as_ref());
}

/// Record a run reaching a terminal status through its monitor.
///
/// # Arguments
/// * `run_id` - The run
/// * `workflow` - The workflow id
/// * `status` - The terminal status written
pub fn record_run_finalized(
    run_id: impl AsRef<str>,
    workflow: impl AsRef<str>,
    status: impl AsRef<str>,
) {
    tracing::info!(
        run_id = %run_id.as_ref(),
        workflow = %workflow.as_ref(),
        status = %status.as_ref(),
        "run finalized"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_finalized(workflow.as_ref(), status.as_ref());
}

/// Record a monitor that ended without a result.
pub fn record_monitor_failed(run_id: impl AsRef<str>, error: impl AsRef<str>) {
    tracing::error!(
        run_id = %run_id.as_ref(),
        error = %error.as_ref(),
        "job monitor ended without a result"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_monitor_failure();
}

/// Record a monitor re-attached by the recovery scan.
pub fn record_run_recovered(run_id: impl AsRef<str>) {
    tracing::info!(
        run_id = %run_id.as_ref(),
        "run still running; reattaching monitor to cluster job"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_recovered();
}

/// Update the number of live monitors in this process.
pub fn set_active_monitors(count: usize) {
    tracing::debug!(active_monitors = count, "active monitors updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_active_monitors(count as f64);
}
