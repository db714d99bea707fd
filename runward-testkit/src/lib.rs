//! In-memory collaborators for testing runward orchestrators.

mod cluster;
mod harness;
mod logging;
mod notifier;
mod store;

pub use cluster::{JobOutcome, ScriptedCluster};
pub use harness::{running_run, test_config, url_input, TestHarness};
pub use logging::init_test_tracing;
pub use notifier::RecordingNotifier;
pub use store::InMemoryRunStore;
