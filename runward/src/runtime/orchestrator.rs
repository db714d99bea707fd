use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Notify};
use tracing::Instrument;

use crate::cluster::ComputeCluster;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::events::{RunEvent, RunEventPayload, RunEventPublisher};
use crate::notify::{Notification, NotificationDispatcher};
use crate::run::{IoDescriptor, Run, RunId, RunStatus};
use crate::store::{read_status, RunStore};
use crate::telemetry::{record_run_launched, record_run_recovered, recovery_span, run_launch_span};
use crate::workflow::WorkflowKind;

use super::monitor::{ActiveMonitors, JobMonitor};
use super::recovery::{RecoveryReport, RecoveryScanner};

/// Token for signaling shutdown to job monitors.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `cancel` is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Launches runs, keeps one monitor per active run, and recovers runs left
/// `RUNNING` by a previous process.
///
/// Construction has no side effects on the store; call
/// [`recover_all`](Self::recover_all) once at startup to re-attach monitors.
pub struct RunOrchestrator {
    config: Arc<OrchestratorConfig>,
    store: Arc<dyn RunStore>,
    cluster: Arc<dyn ComputeCluster>,
    notifications: NotificationDispatcher,
    events: Arc<dyn RunEventPublisher>,
    monitors: ActiveMonitors,
    shutdown_token: ShutdownToken,
}

impl fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("config", &self.config)
            .field("monitors", &self.monitors)
            .field("notifications", &self.notifications)
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl RunOrchestrator {
    /// Create an orchestrator from its collaborators.
    ///
    /// Prefer [`RunOrchestratorBuilder`](super::RunOrchestratorBuilder), which
    /// fills in defaults and starts the notification dispatcher.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn RunStore>,
        cluster: Arc<dyn ComputeCluster>,
        notifications: NotificationDispatcher,
        events: Arc<dyn RunEventPublisher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            cluster,
            notifications,
            events,
            monitors: ActiveMonitors::new(),
            shutdown_token: ShutdownToken::new(),
        }
    }

    /// Get the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get a clone of the run store.
    pub fn store(&self) -> Arc<dyn RunStore> {
        Arc::clone(&self.store)
    }

    /// Get the registry of live monitors.
    pub fn monitors(&self) -> &ActiveMonitors {
        &self.monitors
    }

    /// Subscribe to run lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe_runs()
    }

    /// Submit a run of `workflow_id` to the cluster and start monitoring it.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::UnknownWorkflow`] for an unrecognised id.
    /// - [`OrchestratorError::MissingInputs`] when the workflow needs inputs
    ///   and none were given.
    /// - [`OrchestratorError::Submission`] when the cluster refuses the job.
    ///   Nothing is persisted.
    /// - [`OrchestratorError::Persistence`] when the job was submitted but the
    ///   run could not be recorded. The cluster job is orphaned.
    pub async fn launch(
        &self,
        workflow_id: &str,
        email: Option<String>,
        inputs: Vec<IoDescriptor>,
    ) -> Result<RunId> {
        let span = run_launch_span(workflow_id);
        self.launch_inner(workflow_id, email, inputs)
            .instrument(span)
            .await
    }

    async fn launch_inner(
        &self,
        workflow_id: &str,
        email: Option<String>,
        inputs: Vec<IoDescriptor>,
    ) -> Result<RunId> {
        let workflow = WorkflowKind::parse(workflow_id)?;
        let profile = workflow.profile(&self.config.workflows);
        if inputs.is_empty() && !profile.allow_empty_inputs {
            return Err(OrchestratorError::MissingInputs(workflow));
        }
        let email = email.filter(|address| !address.trim().is_empty());

        let submission = workflow.submission(&self.config.workflows, inputs.clone());
        let run_id = self.cluster.submit(submission).await.map_err(|err| {
            tracing::warn!("cluster submission failed: {err}");
            err
        })?;
        tracing::Span::current().record("run_id", run_id.as_str());

        if let Some(address) = email.as_deref() {
            let url = self.config.run_url(workflow.as_str(), run_id.as_str());
            self.notifications
                .dispatch(Notification::run_started(address, url));
        }

        let run = Run::running(run_id.clone(), workflow, email, inputs);
        if let Err(err) = self.store.put(&run).await {
            tracing::error!(
                run_id = %run_id,
                "cluster job submitted but run could not be recorded; job is orphaned: {err}"
            );
            let mut failed = run;
            if failed.mark_error().is_ok() {
                if let Err(retry_err) = self.store.put(&failed).await {
                    tracing::warn!(run_id = %run_id, "could not record run as errored: {retry_err}");
                }
            }
            return Err(err.into());
        }

        record_run_launched(&run_id, workflow.as_str());
        self.emit(&run_id, RunEventPayload::Launched { workflow })
            .await;
        self.spawn_monitor(run_id.clone(), false).await;

        Ok(run_id)
    }

    /// Current status of a run.
    pub async fn get_status(&self, run_id: &RunId) -> Result<RunStatus> {
        read_status(self.store.as_ref(), run_id)
            .await?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.clone()))
    }

    /// The full run record.
    pub async fn get_run(&self, run_id: &RunId) -> Result<Run> {
        self.store
            .get(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.clone()))
    }

    /// Flag a `RUNNING` run as canceling.
    ///
    /// The run's monitor keeps waiting; the cluster job is not stopped here.
    pub async fn request_cancel(&self, run_id: &RunId) -> Result<Run> {
        let mut run = self.get_run(run_id).await?;
        run.request_cancel()?;
        self.store.put(&run).await?;
        tracing::info!(run_id = %run_id, "cancellation requested");
        self.emit(run_id, RunEventPayload::CancelRequested).await;
        Ok(run)
    }

    /// Move a `RUNNING` run to `CANCELED`.
    ///
    /// A monitor that resolves afterwards sees the terminal status and leaves
    /// the record alone.
    pub async fn acknowledge_cancel(&self, run_id: &RunId) -> Result<Run> {
        let mut run = self.get_run(run_id).await?;
        run.acknowledge_cancel()?;
        self.store.put(&run).await?;
        tracing::info!(run_id = %run_id, "run canceled");
        self.emit(run_id, RunEventPayload::Canceled).await;
        Ok(run)
    }

    /// Re-attach monitors to every `RUNNING` run in the store.
    ///
    /// Meant to be called once at process start. Runs already monitored by
    /// this process are counted but not given a second monitor.
    ///
    /// # Errors
    ///
    /// Fails only if the store cannot list run ids.
    pub async fn recover_all(&self) -> Result<RecoveryReport> {
        self.recover_inner().instrument(recovery_span()).await
    }

    async fn recover_inner(&self) -> Result<RecoveryReport> {
        let candidates = RecoveryScanner::new(Arc::clone(&self.store))
            .scan()
            .await?;

        let mut report = RecoveryReport {
            scanned: candidates.scanned,
            failed: candidates.failed,
            ..RecoveryReport::default()
        };

        for run_id in candidates.running {
            if self.spawn_monitor(run_id.clone(), true).await {
                record_run_recovered(&run_id);
                report.reattached += 1;
            } else {
                tracing::debug!(run_id = %run_id, "run already monitored");
                report.already_monitored += 1;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            reattached = report.reattached,
            already_monitored = report.already_monitored,
            failed = report.failed,
            "recovery scan complete"
        );
        Ok(report)
    }

    /// Whether this process has a live monitor for `run_id`.
    pub async fn is_monitored(&self, run_id: &RunId) -> bool {
        self.monitors.contains(run_id).await
    }

    /// Number of live monitors in this process.
    pub async fn active_monitors(&self) -> usize {
        self.monitors.len().await
    }

    /// Stop every monitor. Their runs stay `RUNNING` and are picked up by
    /// the next [`recover_all`](Self::recover_all).
    pub async fn shutdown(&self) {
        tracing::info!("Initiating shutdown of run orchestrator");
        self.shutdown_token.cancel();
        let aborted = self.monitors.abort_all().await;
        tracing::info!(aborted, "Run orchestrator shutdown complete");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    async fn spawn_monitor(&self, run_id: RunId, recovered: bool) -> bool {
        if self.shutdown_token.is_cancelled() {
            tracing::warn!(run_id = %run_id, "orchestrator shut down; monitor not started");
            return false;
        }

        let monitor = JobMonitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cluster),
            self.notifications.clone(),
            Arc::clone(&self.events),
            Arc::clone(&self.config),
        );
        let shutdown = self.shutdown_token.clone();
        let id = run_id.clone();

        self.monitors
            .spawn_if_absent(run_id, async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!(run_id = %id, "monitor stopped by shutdown");
                    }
                    outcome = monitor.run(id.clone(), recovered) => {
                        tracing::debug!(run_id = %id, ?outcome, "monitor finished");
                    }
                }
            })
            .await
    }

    async fn emit(&self, run_id: &RunId, payload: RunEventPayload) {
        if let Err(err) = self
            .events
            .publish(RunEvent::new(run_id.clone(), payload))
            .await
        {
            tracing::debug!(run_id = %run_id, "run event not published: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_token_wakes_waiters() {
        let token = ShutdownToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_after_cancel() {
        let token = ShutdownToken::default();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-cancelled token should not wait");
    }
}
