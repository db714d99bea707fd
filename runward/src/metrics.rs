//! Prometheus metrics instrumentation for runward.
//!
//! All metrics are conditionally compiled behind the `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `runward_runs_launched_total` - Runs launched, by workflow
//! - `runward_runs_finalized_total` - Runs finalized by a monitor, by workflow and status
//! - `runward_monitor_failures_total` - Monitors that ended on a cluster error or timeout
//! - `runward_runs_recovered_total` - Monitors re-attached at startup
//!
//! ## Gauges
//! - `runward_active_monitors` - Monitors live in this process
#![cfg(feature = "metrics")]

use prometheus::{CounterVec, Gauge, IntCounter, Opts, Registry};
use std::sync::LazyLock;

/// Global Prometheus registry for runward metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for launched runs.
///
/// Labels:
/// - `workflow`: The workflow id
pub static RUNS_LAUNCHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("runward_runs_launched_total", "Total number of runs launched");
    CounterVec::new(opts, &["workflow"]).expect("runward_runs_launched_total metric creation failed")
});

/// Counter for runs finalized by their monitor.
///
/// Labels:
/// - `workflow`: The workflow id
/// - `status`: The terminal status (COMPLETED, ERROR)
pub static RUNS_FINALIZED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "runward_runs_finalized_total",
        "Total number of runs finalized by a job monitor",
    );
    CounterVec::new(opts, &["workflow", "status"])
        .expect("runward_runs_finalized_total metric creation failed")
});

pub static MONITOR_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "runward_monitor_failures_total",
        "Total number of job monitors that ended without a result",
    )
    .expect("runward_monitor_failures_total metric creation failed")
});

pub static RUNS_RECOVERED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "runward_runs_recovered_total",
        "Total number of monitors re-attached by the recovery scan",
    )
    .expect("runward_runs_recovered_total metric creation failed")
});

pub static ACTIVE_MONITORS: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("runward_active_monitors", "Job monitors live in this process")
        .expect("runward_active_monitors metric creation failed")
});

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(RUNS_LAUNCHED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(RUNS_FINALIZED_TOTAL.clone()),
        Box::new(MONITOR_FAILURES_TOTAL.clone()),
        Box::new(RUNS_RECOVERED_TOTAL.clone()),
        Box::new(ACTIVE_MONITORS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_run_launched(workflow: &str) {
    RUNS_LAUNCHED_TOTAL.with_label_values(&[workflow]).inc();
}

pub fn record_run_finalized(workflow: &str, status: &str) {
    RUNS_FINALIZED_TOTAL
        .with_label_values(&[workflow, status])
        .inc();
}

pub fn record_monitor_failure() {
    MONITOR_FAILURES_TOTAL.inc();
}

pub fn record_run_recovered() {
    RUNS_RECOVERED_TOTAL.inc();
}

pub fn set_active_monitors(count: f64) {
    ACTIVE_MONITORS.set(count);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_twice() {
        init_metrics().expect("first init");
        init_metrics().expect("second init");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_run_launched("0");
        record_run_finalized("0", "COMPLETED");
        record_run_recovered();

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("runward_runs_launched_total"));
        assert!(output.contains("runward_runs_finalized_total"));
        assert!(output.contains("runward_runs_recovered_total"));
    }
}
