/// Runtime builder for constructing orchestrator instances.
pub mod builder;
/// Job monitors and the registry of live monitors.
pub mod monitor;
/// The run orchestrator: launch, status, cancellation, recovery, shutdown.
pub mod orchestrator;
/// Startup scan for runs left running.
pub mod recovery;

pub use builder::RunOrchestratorBuilder;
pub use monitor::{ActiveMonitors, JobMonitor, MonitorOutcome};
pub use orchestrator::{RunOrchestrator, ShutdownToken};
pub use recovery::{RecoveryCandidates, RecoveryReport, RecoveryScanner};
