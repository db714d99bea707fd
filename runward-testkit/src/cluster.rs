use async_trait::async_trait;
use parking_lot::Mutex;
use runward::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How a scripted job ends.
#[derive(Clone, Debug)]
pub enum JobOutcome {
    Finished(JobResult),
    /// The awaiting call fails with a transport error carrying this message.
    Lost(String),
}

/// Compute cluster whose jobs finish when the test says so.
///
/// Submissions are assigned ids `run-1`, `run-2`, ... in call order.
/// `await_result` stays pending until an outcome is scripted for the run
/// (or a default outcome is set). Outcomes are not consumed: a second await
/// for the same run sees the same result, like a cluster that stores
/// finished jobs.
#[derive(Clone, Default)]
pub struct ScriptedCluster {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    changed: Notify,
    next_id: AtomicU64,
}

#[derive(Default)]
struct State {
    reject_submissions: Option<String>,
    outcomes: HashMap<RunId, JobOutcome>,
    default_outcome: Option<JobOutcome>,
    submissions: Vec<JobSubmission>,
    await_calls: Vec<RunId>,
}

impl ScriptedCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission with `reason` until cleared with `None`.
    pub fn reject_submissions(&self, reason: Option<&str>) {
        self.inner.state.lock().reject_submissions = reason.map(str::to_string);
    }

    pub fn set_default(&self, outcome: JobOutcome) {
        self.inner.state.lock().default_outcome = Some(outcome);
        self.inner.changed.notify_waiters();
    }

    /// Finish the job for `run_id`, waking any monitor awaiting it.
    pub fn finish(&self, run_id: impl Into<RunId>, result: JobResult) {
        self.script(run_id.into(), JobOutcome::Finished(result));
    }

    /// Fail the awaiting call for `run_id`.
    pub fn lose(&self, run_id: impl Into<RunId>, reason: &str) {
        self.script(run_id.into(), JobOutcome::Lost(reason.to_string()));
    }

    fn script(&self, run_id: RunId, outcome: JobOutcome) {
        self.inner.state.lock().outcomes.insert(run_id, outcome);
        self.inner.changed.notify_waiters();
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.inner.state.lock().submissions.clone()
    }

    /// Run ids passed to `await_result`, in call order.
    pub fn await_calls(&self) -> Vec<RunId> {
        self.inner.state.lock().await_calls.clone()
    }

    pub fn await_count_for(&self, run_id: &RunId) -> usize {
        self.inner
            .state
            .lock()
            .await_calls
            .iter()
            .filter(|id| *id == run_id)
            .count()
    }

    /// Wait until at least `count` `await_result` calls have been made.
    pub async fn wait_for_awaits(&self, count: usize, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            loop {
                let notified = self.inner.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inner.state.lock().await_calls.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    fn outcome_for(&self, run_id: &RunId) -> Option<JobOutcome> {
        let state = self.inner.state.lock();
        state
            .outcomes
            .get(run_id)
            .or(state.default_outcome.as_ref())
            .cloned()
    }
}

#[async_trait]
impl ComputeCluster for ScriptedCluster {
    async fn submit(&self, submission: JobSubmission) -> Result<RunId, SubmissionError> {
        let mut state = self.inner.state.lock();
        if let Some(reason) = &state.reject_submissions {
            return Err(SubmissionError::Rejected(reason.clone()));
        }
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let run_id = RunId::new(format!("run-{n}"));
        state.submissions.push(submission);
        Ok(run_id)
    }

    async fn await_result(&self, run_id: &RunId) -> Result<JobResult, ClusterError> {
        self.inner.state.lock().await_calls.push(run_id.clone());
        self.inner.changed.notify_waiters();

        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.outcome_for(run_id) {
                Some(JobOutcome::Finished(result)) => return Ok(result),
                Some(JobOutcome::Lost(reason)) => {
                    return Err(ClusterError::Transport(anyhow::anyhow!(reason)))
                }
                None => notified.await,
            }
        }
    }
}
