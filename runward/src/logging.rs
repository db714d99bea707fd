//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from the `RUNWARD_LOG` environment variable, using
//! `EnvFilter` directive syntax (e.g. `info`, `runward=debug,sqlx=warn`).
//! Without it the level is `info`. Output goes to stderr.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "RUNWARD_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter from `RUNWARD_LOG`, falling back to `info` when the
/// variable is unset or unparsable.
pub fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => EnvFilter::try_new(raw.trim())
            .unwrap_or_else(|err| {
                eprintln!("ignoring invalid {LOG_ENV}={raw:?}: {err}");
                EnvFilter::new(DEFAULT_DIRECTIVE)
            }),
        _ => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

/// Install the global subscriber. Call once at process startup.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
