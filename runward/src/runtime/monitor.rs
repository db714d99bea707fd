use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::cluster::ComputeCluster;
use crate::config::OrchestratorConfig;
use crate::error::{ClusterError, TransitionError};
use crate::events::{RunEvent, RunEventPayload, RunEventPublisher};
use crate::notify::{Notification, NotificationDispatcher};
use crate::run::{JobResult, Run, RunId, RunStatus};
use crate::store::RunStore;
use crate::telemetry::{
    instrument_monitor, record_monitor_failed, record_run_finalized, set_active_monitors,
};

/// How a single monitor ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The monitor wrote this terminal status.
    Finalized(RunStatus),
    /// The record was already terminal when the result arrived; nothing written.
    Skipped(RunStatus),
    /// No record exists for the run.
    Missing,
    /// The cluster or the store failed. The run keeps whatever status it had.
    Failed,
}

enum Awaited {
    Resolved(JobResult),
    Rejected(ClusterError),
    TimedOut(Duration),
}

/// Awaits one run's job and writes the outcome back to the store.
///
/// A monitor holds only the run id. The record is read after the cluster
/// resolves so a status written in the meantime (a cancellation, a second
/// monitor in another process) is seen before anything is written.
#[derive(Clone)]
pub struct JobMonitor {
    store: Arc<dyn RunStore>,
    cluster: Arc<dyn ComputeCluster>,
    notifications: NotificationDispatcher,
    events: Arc<dyn RunEventPublisher>,
    config: Arc<OrchestratorConfig>,
}

impl fmt::Debug for JobMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMonitor")
            .field("monitor_timeout", &self.config.monitor_timeout())
            .field("notifications", &self.notifications)
            .finish()
    }
}

impl JobMonitor {
    pub fn new(
        store: Arc<dyn RunStore>,
        cluster: Arc<dyn ComputeCluster>,
        notifications: NotificationDispatcher,
        events: Arc<dyn RunEventPublisher>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            store,
            cluster,
            notifications,
            events,
            config,
        }
    }

    /// Wait for the run's job to finish and persist the outcome.
    ///
    /// Errors never escape: every failure is logged with the run id and
    /// reported through the returned [`MonitorOutcome`].
    pub async fn run(&self, run_id: RunId, recovered: bool) -> MonitorOutcome {
        let span_id = run_id.clone();
        instrument_monitor(span_id, recovered, self.watch(run_id, recovered)).await
    }

    async fn watch(&self, run_id: RunId, recovered: bool) -> MonitorOutcome {
        self.emit(&run_id, RunEventPayload::MonitorAttached { recovered })
            .await;
        tracing::debug!("awaiting job result");

        match self.await_job(&run_id).await {
            Awaited::Resolved(result) => {
                tracing::debug!(exit_code = result.exit_code, "job finished");
                self.finalize(&run_id, |run| run.apply_result(result)).await
            }
            Awaited::Rejected(err) => {
                let message = err.to_string();
                record_monitor_failed(&run_id, &message);
                self.emit(&run_id, RunEventPayload::MonitorFailed { error: message })
                    .await;
                MonitorOutcome::Failed
            }
            Awaited::TimedOut(limit) => {
                let message = format!("no job result within {}ms", limit.as_millis());
                record_monitor_failed(&run_id, &message);
                self.emit(&run_id, RunEventPayload::MonitorFailed { error: message })
                    .await;
                self.finalize(&run_id, |run| {
                    run.mark_error()?;
                    Ok(RunStatus::Error)
                })
                .await
            }
        }
    }

    async fn await_job(&self, run_id: &RunId) -> Awaited {
        let pending = self.cluster.await_result(run_id);
        let outcome = match self.config.monitor_timeout() {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome,
                Err(_) => return Awaited::TimedOut(limit),
            },
            None => pending.await,
        };
        match outcome {
            Ok(result) => Awaited::Resolved(result),
            Err(err) => Awaited::Rejected(err),
        }
    }

    async fn finalize<F>(&self, run_id: &RunId, apply: F) -> MonitorOutcome
    where
        F: FnOnce(&mut Run) -> Result<RunStatus, TransitionError>,
    {
        let mut run = match self.store.get(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                tracing::error!(run_id = %run_id, "job finished but no run record exists");
                return MonitorOutcome::Missing;
            }
            Err(err) => {
                tracing::error!(run_id = %run_id, "failed to read run after job finished: {err}");
                return MonitorOutcome::Failed;
            }
        };

        if run.status.is_terminal() {
            tracing::warn!(
                run_id = %run_id,
                status = %run.status,
                "run already terminal; leaving record untouched"
            );
            let status = run.status;
            self.emit(run_id, RunEventPayload::FinalizeSkipped { status })
                .await;
            self.notify_ended(&run);
            return MonitorOutcome::Skipped(status);
        }

        let status = match apply(&mut run) {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(run_id = %run_id, "cannot finalize run: {err}");
                self.notify_ended(&run);
                return MonitorOutcome::Failed;
            }
        };

        if let Err(err) = self.store.put(&run).await {
            tracing::error!(
                run_id = %run_id,
                status = %status,
                "failed to persist run outcome: {err}"
            );
            self.notify_ended(&run);
            return MonitorOutcome::Failed;
        }

        record_run_finalized(run_id, run.workflow_id.as_str(), status.as_str());
        self.emit(run_id, RunEventPayload::Finalized { status }).await;
        self.notify_ended(&run);
        MonitorOutcome::Finalized(status)
    }

    fn notify_ended(&self, run: &Run) {
        if let Some(email) = run.email.as_deref() {
            let url = self
                .config
                .run_url(run.workflow_id.as_str(), run.id.as_str());
            self.notifications.dispatch(Notification::run_ended(email, url));
        }
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

/// Runs that have a live monitor in this process.
///
/// Not authoritative: it only prevents a second monitor for the same run from
/// being started here. Entries are removed when their task ends.
#[derive(Clone, Default)]
pub struct ActiveMonitors {
    inner: Arc<Mutex<HashMap<RunId, AbortHandle>>>,
}

impl fmt::Debug for ActiveMonitors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .inner
            .try_lock()
            .map(|guard| guard.len())
            .unwrap_or_default();
        f.debug_struct("ActiveMonitors")
            .field("count", &count)
            .finish()
    }
}

impl ActiveMonitors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` as the monitor for `run_id` unless one is already live.
    ///
    /// Returns `false` without spawning when the run is already monitored.
    /// The check and the insert happen under one lock.
    pub async fn spawn_if_absent<F>(&self, run_id: RunId, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.inner.lock().await;
        if guard.contains_key(&run_id) {
            return false;
        }

        let registry = self.clone();
        let finished = run_id.clone();
        let handle = tokio::spawn(async move {
            task.await;
            registry.remove(&finished).await;
        });

        guard.insert(run_id, handle.abort_handle());
        set_active_monitors(guard.len());
        true
    }

    pub async fn contains(&self, run_id: &RunId) -> bool {
        self.inner.lock().await.contains_key(run_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Abort every live monitor and clear the registry. Returns how many
    /// were aborted.
    pub async fn abort_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut guard = self.inner.lock().await;
            guard.drain().collect()
        };
        for (run_id, handle) in &drained {
            tracing::debug!(run_id = %run_id, "aborting job monitor");
            handle.abort();
        }
        set_active_monitors(0);
        drained.len()
    }

    async fn remove(&self, run_id: &RunId) {
        let mut guard = self.inner.lock().await;
        guard.remove(run_id);
        set_active_monitors(guard.len());
    }
}
