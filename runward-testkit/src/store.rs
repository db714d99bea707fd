use async_trait::async_trait;
use parking_lot::Mutex;
use runward::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Run store kept in memory.
///
/// Records are held in their encoded JSON form so reads go through the same
/// codec as a real backend. Failures can be switched on per operation or per
/// run id.
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    records: Arc<Mutex<HashMap<RunId, serde_json::Value>>>,
    writes: Arc<Mutex<Vec<Run>>>,
    faults: Arc<Mutex<Faults>>,
}

#[derive(Default)]
struct Faults {
    puts: bool,
    next_puts: usize,
    gets: bool,
    list: bool,
    get_ids: HashSet<RunId>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a run directly, bypassing failure injection and the write log.
    pub fn seed(&self, run: Run) {
        let record = serde_json::to_value(&run).expect("seeded run serializes");
        self.records.lock().insert(run.id.clone(), record);
    }

    /// Store an arbitrary record under `run_id`, e.g. a corrupt one.
    pub fn insert_raw(&self, run_id: impl Into<RunId>, record: serde_json::Value) {
        self.records.lock().insert(run_id.into(), record);
    }

    /// Decoded copy of a record, bypassing failure injection.
    pub fn snapshot(&self, run_id: &RunId) -> Option<Run> {
        self.records
            .lock()
            .get(run_id)
            .cloned()
            .and_then(|record| serde_json::from_value(record).ok())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Every successful `put`, in order.
    pub fn writes(&self) -> Vec<Run> {
        self.writes.lock().clone()
    }

    /// Successful `put`s for one run.
    pub fn writes_for(&self, run_id: &RunId) -> Vec<Run> {
        self.writes
            .lock()
            .iter()
            .filter(|run| &run.id == run_id)
            .cloned()
            .collect()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.faults.lock().puts = fail;
    }

    /// Fail only the next `count` puts; later ones succeed.
    pub fn fail_next_puts(&self, count: usize) {
        self.faults.lock().next_puts = count;
    }

    pub fn fail_gets(&self, fail: bool) {
        self.faults.lock().gets = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        self.faults.lock().list = fail;
    }

    /// Make `get` fail for one run only.
    pub fn fail_get_for(&self, run_id: impl Into<RunId>) {
        self.faults.lock().get_ids.insert(run_id.into());
    }

    fn injected(operation: &str) -> PersistenceError {
        PersistenceError::backend(anyhow::anyhow!("injected {operation} failure"))
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn get(&self, run_id: &RunId) -> Result<Option<Run>, PersistenceError> {
        {
            let faults = self.faults.lock();
            if faults.gets || faults.get_ids.contains(run_id) {
                return Err(Self::injected("get"));
            }
        }
        let record = self.records.lock().get(run_id).cloned();
        record.map(|record| decode_run(run_id, record)).transpose()
    }

    async fn put(&self, run: &Run) -> Result<(), PersistenceError> {
        {
            let mut faults = self.faults.lock();
            if faults.puts {
                return Err(Self::injected("put"));
            }
            if faults.next_puts > 0 {
                faults.next_puts -= 1;
                return Err(Self::injected("put"));
            }
        }
        let record = encode_run(run)?;
        self.records.lock().insert(run.id.clone(), record);
        self.writes.lock().push(run.clone());
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<RunId>, PersistenceError> {
        if self.faults.lock().list {
            return Err(Self::injected("list"));
        }
        Ok(self.records.lock().keys().cloned().collect())
    }
}
