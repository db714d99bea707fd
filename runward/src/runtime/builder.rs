use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::cluster::ComputeCluster;
use crate::config::OrchestratorConfig;
use crate::events::{InProcEventBus, RunEventPublisher};
use crate::notify::{LogNotifier, NotificationDispatcher, Notifier};
use crate::store::RunStore;

use super::orchestrator::RunOrchestrator;

/// Builder for constructing a `RunOrchestrator` with explicit dependencies.
///
/// The store and the cluster are required. Without a notifier, notifications
/// are only logged; without an event publisher, an [`InProcEventBus`] sized
/// by `event_capacity` is created.
///
/// # Example
///
/// ```ignore
/// use runward::*;
///
/// let orchestrator = RunOrchestratorBuilder::new(OrchestratorConfig::from_env()?)
///     .with_store(store)
///     .with_cluster(cluster)
///     .with_notifier(mailer)
///     .build()?;
/// orchestrator.recover_all().await?;
/// ```
pub struct RunOrchestratorBuilder {
    config: OrchestratorConfig,
    store: Option<(Arc<dyn RunStore>, &'static str)>,
    cluster: Option<(Arc<dyn ComputeCluster>, &'static str)>,
    notifier: Option<(Arc<dyn Notifier>, &'static str)>,
    events: Option<Arc<dyn RunEventPublisher>>,
}

impl fmt::Debug for RunOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("RunOrchestratorBuilder");
        debug.field("config", &self.config);
        debug.field("events_set", &self.events.is_some());

        if let Some((_, name)) = &self.store {
            debug.field("store_type", name);
        }
        if let Some((_, name)) = &self.cluster {
            debug.field("cluster_type", name);
        }
        if let Some((_, name)) = &self.notifier {
            debug.field("notifier_type", name);
        }

        debug.finish()
    }
}

impl RunOrchestratorBuilder {
    /// Create a new builder with the given configuration.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            store: None,
            cluster: None,
            notifier: None,
            events: None,
        }
    }

    /// Set the run store.
    pub fn with_store<S: RunStore + 'static>(mut self, store: Arc<S>) -> Self {
        let store: Arc<dyn RunStore> = store;
        self.store = Some((store, type_name::<S>()));
        self
    }

    /// Set the compute cluster client.
    pub fn with_cluster<C: ComputeCluster + 'static>(mut self, cluster: Arc<C>) -> Self {
        let cluster: Arc<dyn ComputeCluster> = cluster;
        self.cluster = Some((cluster, type_name::<C>()));
        self
    }

    /// Set the notifier used for lifecycle emails.
    pub fn with_notifier<N: Notifier + 'static>(mut self, notifier: Arc<N>) -> Self {
        let notifier: Arc<dyn Notifier> = notifier;
        self.notifier = Some((notifier, type_name::<N>()));
        self
    }

    /// Set the event publisher.
    pub fn with_events(mut self, events: Arc<dyn RunEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the `RunOrchestrator`.
    ///
    /// Starts the notification delivery task, so it must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cluster is missing, or if no tokio
    /// runtime is running.
    pub fn build(self) -> anyhow::Result<RunOrchestrator> {
        let (store, _) = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store dependency missing"))?;
        let (cluster, _) = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("cluster dependency missing"))?;
        let notifier = match self.notifier {
            Some((notifier, _)) => notifier,
            None => {
                tracing::warn!("no notifier configured; lifecycle emails will only be logged");
                Arc::new(LogNotifier) as Arc<dyn Notifier>
            }
        };
        let events = self
            .events
            .unwrap_or_else(|| {
                Arc::new(InProcEventBus::new(self.config.event_capacity)) as Arc<dyn RunEventPublisher>
            });

        tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow::anyhow!("orchestrator must be built inside a tokio runtime"))?;
        let notifications = NotificationDispatcher::spawn(notifier);

        Ok(RunOrchestrator::new(
            self.config,
            store,
            cluster,
            notifications,
            events,
        ))
    }
}
