use runward::*;
use std::sync::Arc;
use std::time::Duration;

use crate::{InMemoryRunStore, RecordingNotifier, ScriptedCluster};

/// An orchestrator wired to in-memory collaborators, with handles to each.
pub struct TestHarness {
    pub orchestrator: RunOrchestrator,
    pub store: InMemoryRunStore,
    pub cluster: ScriptedCluster,
    pub notifier: RecordingNotifier,
}

impl TestHarness {
    /// Default config with `frontend_url` set to `https://apps.test`.
    pub fn new() -> Self {
        Self::with_parts(
            test_config(),
            InMemoryRunStore::new(),
            ScriptedCluster::new(),
            RecordingNotifier::new(),
        )
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self::with_parts(
            config,
            InMemoryRunStore::new(),
            ScriptedCluster::new(),
            RecordingNotifier::new(),
        )
    }

    /// Must be called from within a tokio runtime.
    pub fn with_parts(
        config: OrchestratorConfig,
        store: InMemoryRunStore,
        cluster: ScriptedCluster,
        notifier: RecordingNotifier,
    ) -> Self {
        let orchestrator = RunOrchestratorBuilder::new(config)
            .with_store(Arc::new(store.clone()))
            .with_cluster(Arc::new(cluster.clone()))
            .with_notifier(Arc::new(notifier.clone()))
            .build()
            .expect("test orchestrator builds");
        Self {
            orchestrator,
            store,
            cluster,
            notifier,
        }
    }

    /// Poll the store until `run_id` has `status`. Returns the record on
    /// success, `None` on timeout.
    pub async fn wait_for_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        limit: Duration,
    ) -> Option<Run> {
        tokio::time::timeout(limit, async {
            loop {
                if let Some(run) = self.store.snapshot(run_id) {
                    if run.status == status {
                        return run;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .ok()
    }

    /// Wait until no monitor is live in the orchestrator.
    pub async fn wait_for_idle(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            while self.orchestrator.active_monitors().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_frontend_url("https://apps.test")
}

/// A url input for `name`, hosted under `https://files.test/`.
pub fn url_input(name: &str) -> IoDescriptor {
    IoDescriptor::url(name, format!("https://files.test/{name}"))
}

/// A running run record as a previous process would have left it.
pub fn running_run(id: &str, workflow: WorkflowKind, email: Option<&str>) -> Run {
    Run::running(
        RunId::from(id),
        workflow,
        email.map(str::to_string),
        vec![url_input("protein.pdb")],
    )
}
