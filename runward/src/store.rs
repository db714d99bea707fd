use async_trait::async_trait;
use std::sync::Arc;

use crate::error::PersistenceError;
use crate::run::{Run, RunId, RunStatus};

/// Key-value persistence for run records, keyed by run id.
///
/// Implementations perform whole-record writes with no concurrency control:
/// the last `put` for a run wins. Errors are surfaced as-is; retry policy
/// belongs to callers.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Fetch a run, or `None` if no record exists.
    async fn get(&self, run_id: &RunId) -> Result<Option<Run>, PersistenceError>;

    /// Insert or replace the record for `run.id`.
    async fn put(&self, run: &Run) -> Result<(), PersistenceError>;

    /// Every run id in the store, in no particular order.
    async fn list_ids(&self) -> Result<Vec<RunId>, PersistenceError>;
}

#[async_trait]
impl<S: RunStore + ?Sized> RunStore for Arc<S> {
    async fn get(&self, run_id: &RunId) -> Result<Option<Run>, PersistenceError> {
        (**self).get(run_id).await
    }

    async fn put(&self, run: &Run) -> Result<(), PersistenceError> {
        (**self).put(run).await
    }

    async fn list_ids(&self) -> Result<Vec<RunId>, PersistenceError> {
        (**self).list_ids().await
    }
}

/// Encode a run the way it is stored at rest.
pub fn encode_run(run: &Run) -> Result<serde_json::Value, PersistenceError> {
    serde_json::to_value(run).map_err(|source| PersistenceError::Codec {
        run_id: run.id.clone(),
        source,
    })
}

/// Decode a stored record.
pub fn decode_run(run_id: &RunId, record: serde_json::Value) -> Result<Run, PersistenceError> {
    serde_json::from_value(record).map_err(|source| PersistenceError::Codec {
        run_id: run_id.clone(),
        source,
    })
}

/// Read a run's status. `None` when no record exists; a record without a
/// status field reads as `IDLE`.
pub async fn read_status<S: RunStore + ?Sized>(
    store: &S,
    run_id: &RunId,
) -> Result<Option<RunStatus>, PersistenceError> {
    Ok(store.get(run_id).await?.map(|run| run.status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowKind;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        runs: Mutex<HashMap<RunId, serde_json::Value>>,
    }

    #[async_trait]
    impl RunStore for MapStore {
        async fn get(&self, run_id: &RunId) -> Result<Option<Run>, PersistenceError> {
            let guard = self.runs.lock().await;
            guard
                .get(run_id)
                .cloned()
                .map(|record| decode_run(run_id, record))
                .transpose()
        }

        async fn put(&self, run: &Run) -> Result<(), PersistenceError> {
            let record = encode_run(run)?;
            self.runs.lock().await.insert(run.id.clone(), record);
            Ok(())
        }

        async fn list_ids(&self) -> Result<Vec<RunId>, PersistenceError> {
            Ok(self.runs.lock().await.keys().cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_read_status_via_arc() {
        let store = Arc::new(MapStore::default());
        let run = Run::running(RunId::from("r"), WorkflowKind::LigandSimulation, None, vec![]);
        store.put(&run).await.unwrap();

        assert_eq!(
            read_status(&store, &RunId::from("r")).await.unwrap(),
            Some(RunStatus::Running)
        );
        assert_eq!(read_status(&store, &RunId::from("missing")).await.unwrap(), None);
    }

    #[test]
    fn test_decode_reports_run_id() {
        let err = decode_run(&RunId::from("bad"), serde_json::json!(42)).unwrap_err();
        match err {
            PersistenceError::Codec { run_id, .. } => assert_eq!(run_id.as_str(), "bad"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
