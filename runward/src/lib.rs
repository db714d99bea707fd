//! Runward - run lifecycle orchestration for cluster-executed workflows.
//!
//! A user submits inputs to a named workflow; runward hands the job to an
//! external compute cluster, records the run, waits for the job in the
//! background, writes the outcome back, and emails the user when the run
//! starts and ends. Runs left `RUNNING` by a previous process are picked up
//! again at startup.
//!
//! # Core Concepts
//!
//! - **Run**: One execution attempt of a workflow. See [`Run`] and the
//!   [`RunStatus`] state machine.
//!
//! - **Run Store**: The [`RunStore`] trait abstracts the key-value store that
//!   owns run records.
//!
//! - **Cluster**: The [`ComputeCluster`] trait submits jobs and awaits their
//!   results.
//!
//! - **Notifications**: The [`Notifier`] trait sends lifecycle emails;
//!   [`NotificationDispatcher`] delivers them in the background.
//!
//! - **Runtime**: The [`RunOrchestrator`] ties the pieces together: launch,
//!   one [`JobMonitor`] per active run, recovery, cancellation and shutdown.
//!
//! # Feature Flags
//!
//! - `postgres` - PostgreSQL run store via sqlx
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use runward::*;
//!
//! let orchestrator = RunOrchestratorBuilder::new(OrchestratorConfig::from_env()?)
//!     .with_store(store)
//!     .with_cluster(cluster)
//!     .with_notifier(mailer)
//!     .build()?;
//! orchestrator.recover_all().await?;
//!
//! let run_id = orchestrator
//!     .launch("0", Some("user@example.com".into()), vec![IoDescriptor::url("in.pdb", url)])
//!     .await?;
//! ```

/// Compute cluster client seam.
pub mod cluster;

/// Configuration structures for the orchestrator, workflows and persistence.
///
/// The `config` module defines [`OrchestratorConfig`], the
/// [`WorkflowCatalog`] of per-workflow submission settings, and
/// [`PersistenceConfig`] for the Postgres store.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Run lifecycle events.
///
/// The `events` module provides [`RunEvent`] and [`RunEventPayload`], the
/// [`RunEventPublisher`] trait, and [`InProcEventBus`] for in-process
/// broadcasting.
pub mod events;

/// Logging setup.
pub mod logging;

#[cfg(feature = "metrics")]
/// Prometheus metrics.
pub mod metrics;

/// Lifecycle email notifications.
pub mod notify;

#[cfg(feature = "postgres")]
/// PostgreSQL persistence implementation.
///
/// The `persistence` module provides a PostgreSQL-backed implementation of
/// the run store when the `postgres` feature is enabled.
pub mod persistence;

/// The run record and its status state machine.
///
/// The `run` module defines:
/// - [`Run`] - one execution attempt
/// - [`RunId`] - identifier assigned by the cluster
/// - [`RunStatus`] - `IDLE`, `RUNNING`, `COMPLETED`, `ERROR`, `CANCELED`
/// - [`IoDescriptor`] - a named input or output
/// - [`JobResult`] - the cluster's final payload for a job
pub mod run;

/// Runtime orchestration.
///
/// The `runtime` module provides the [`RunOrchestrator`] and its builder,
/// the per-run [`JobMonitor`], the [`ActiveMonitors`] registry, the
/// [`RecoveryScanner`] and the [`ShutdownToken`].
pub mod runtime;

/// Run store trait and helpers.
pub mod store;

/// Tracing spans and lifecycle record helpers.
pub mod telemetry;

/// The closed set of workflows and how each is submitted.
pub mod workflow;

pub use cluster::*;
pub use config::*;
pub use error::{
    ClusterError, NotificationError, OrchestratorError, PersistenceError, SubmissionError,
    TransitionError,
};
pub use events::*;
pub use notify::*;
pub use run::*;
pub use runtime::*;
pub use store::*;
pub use workflow::*;
