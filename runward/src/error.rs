use thiserror::Error;

use crate::run::{RunId, RunStatus};
use crate::workflow::WorkflowKind;

/// The cluster refused or never received a submission. No run record exists.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The cluster answered and rejected the job.
    #[error("cluster rejected submission: {0}")]
    Rejected(String),
    /// The cluster could not be reached.
    #[error("cluster unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// The run store failed to read or write a record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing store returned an error.
    #[error("run store backend error: {0}")]
    Backend(#[source] anyhow::Error),
    /// A stored record could not be encoded or decoded.
    #[error("run {run_id} has an unreadable record: {source}")]
    Codec {
        run_id: RunId,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}

/// The awaiting call for a job result failed. The run stays `RUNNING`.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster has no job for run {0}")]
    UnknownJob(RunId),
    #[error("cluster transport failure: {0}")]
    Transport(#[source] anyhow::Error),
}

/// A notification could not be delivered. Always logged, never propagated.
#[derive(Debug, Error)]
#[error("notification to {recipient} failed: {source}")]
pub struct NotificationError {
    pub recipient: String,
    #[source]
    pub source: anyhow::Error,
}

impl NotificationError {
    pub fn new(recipient: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            recipient: recipient.into(),
            source: source.into(),
        }
    }
}

/// A status change that the run state machine does not allow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("run {run_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub run_id: RunId,
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Errors surfaced by the orchestrator's public operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no workflow registered for id `{0}`")]
    UnknownWorkflow(String),

    #[error("workflow {0} requires at least one input")]
    MissingInputs(WorkflowKind),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("run {0} not found")]
    RunNotFound(RunId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_error_converts_into_orchestrator_error() {
        let err: OrchestratorError = SubmissionError::Rejected("queue full".into()).into();
        assert!(matches!(err, OrchestratorError::Submission(_)));
        assert_eq!(err.to_string(), "cluster rejected submission: queue full");
    }

    #[test]
    fn test_transition_error_message() {
        let err = TransitionError {
            run_id: RunId::from("r-1"),
            from: RunStatus::Completed,
            to: RunStatus::Canceled,
        };
        assert_eq!(err.to_string(), "run r-1 cannot move from COMPLETED to CANCELED");
    }

    #[test]
    fn test_notification_error_keeps_recipient() {
        let err = NotificationError::new("u@x.com", anyhow::anyhow!("smtp down"));
        assert_eq!(err.recipient, "u@x.com");
        assert!(err.to_string().contains("smtp down"));
    }
}
