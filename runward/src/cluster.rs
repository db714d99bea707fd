use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ClusterError, SubmissionError};
use crate::run::{JobResult, RunId};
use crate::workflow::JobSubmission;

/// Client for the external compute cluster that executes workflow jobs.
///
/// The cluster is opaque: it accepts submissions and, separately, resolves
/// the final result of a job. `await_result` may stay pending for as long
/// as the job runs, and for a job that already finished it resolves
/// immediately with the stored result.
#[async_trait]
pub trait ComputeCluster: Send + Sync {
    /// Start a job and return the run id the cluster assigned to it.
    async fn submit(&self, submission: JobSubmission) -> Result<RunId, SubmissionError>;

    /// Wait for the job behind `run_id` to finish.
    async fn await_result(&self, run_id: &RunId) -> Result<JobResult, ClusterError>;
}

#[async_trait]
impl<C: ComputeCluster + ?Sized> ComputeCluster for Arc<C> {
    async fn submit(&self, submission: JobSubmission) -> Result<RunId, SubmissionError> {
        (**self).submit(submission).await
    }

    async fn await_result(&self, run_id: &RunId) -> Result<JobResult, ClusterError> {
        (**self).await_result(run_id).await
    }
}
