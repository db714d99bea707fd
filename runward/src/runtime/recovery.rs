use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::PersistenceError;
use crate::run::{RunId, RunStatus};
use crate::store::RunStore;

/// Summary of one recovery scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Run ids listed by the store.
    pub scanned: usize,
    /// `RUNNING` runs that got a new monitor.
    pub reattached: usize,
    /// `RUNNING` runs that already had a monitor in this process.
    pub already_monitored: usize,
    /// Runs whose record could not be read.
    pub failed: usize,
}

impl RecoveryReport {
    /// Runs found `RUNNING`, monitored before or after the scan.
    pub fn running(&self) -> usize {
        self.reattached + self.already_monitored
    }
}

/// What a pass over the store found, before any monitor is started.
#[derive(Clone, Debug, Default)]
pub struct RecoveryCandidates {
    pub scanned: usize,
    pub running: Vec<RunId>,
    pub failed: usize,
}

/// Finds runs that were left `RUNNING`, e.g. by a process restart.
#[derive(Clone)]
pub struct RecoveryScanner {
    store: Arc<dyn RunStore>,
}

impl RecoveryScanner {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    /// Read every run and collect the ids still `RUNNING`.
    ///
    /// Only a failure to list ids is returned as an error. A record that
    /// cannot be read is logged, counted in `failed`, and skipped.
    pub async fn scan(&self) -> Result<RecoveryCandidates, PersistenceError> {
        let ids = self.store.list_ids().await?;
        let mut candidates = RecoveryCandidates {
            scanned: ids.len(),
            ..RecoveryCandidates::default()
        };

        for run_id in ids {
            match self.store.get(&run_id).await {
                Ok(Some(run)) if run.status == RunStatus::Running => {
                    candidates.running.push(run_id);
                }
                Ok(Some(run)) => {
                    tracing::trace!(run_id = %run_id, status = %run.status, "run not running; skipped");
                }
                Ok(None) => {
                    tracing::debug!(run_id = %run_id, "run listed but gone before read");
                }
                Err(err) => {
                    tracing::error!(run_id = %run_id, "failed to read run during recovery: {err}");
                    candidates.failed += 1;
                }
            }
        }

        Ok(candidates)
    }
}
