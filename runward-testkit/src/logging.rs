use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once per test binary.
///
/// The filter comes from `RUNWARD_LOG`, defaulting to `warn`. Later calls are
/// no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_env(runward::logging::LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
