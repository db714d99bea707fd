use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::TransitionError;
use crate::workflow::WorkflowKind;

/// Identifier of a run, assigned by the compute cluster at submission.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a run.
///
/// `Idle` is the pre-submission state and also what an unset status reads as.
/// `Completed`, `Error` and `Canceled` are terminal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Error => "ERROR",
            RunStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Error | RunStatus::Canceled
        )
    }

    /// Status a finished job maps to.
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Error
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Idle -> Error` covers launches whose bookkeeping failed before the
    /// run was ever marked running.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Idle, RunStatus::Running)
                | (RunStatus::Idle, RunStatus::Error)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Error)
                | (RunStatus::Running, RunStatus::Canceled)
        )
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "IDLE" => Ok(RunStatus::Idle),
            "RUNNING" => Ok(RunStatus::Running),
            "COMPLETED" => Ok(RunStatus::Completed),
            "ERROR" => Ok(RunStatus::Error),
            "CANCELED" | "CANCELLED" => Ok(RunStatus::Canceled),
            other => Err(format!("unknown run status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoKind {
    /// `value` is a retrievable location.
    Url,
    /// `value` carries the content itself.
    Inline,
}

/// A named input or output of a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IoDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IoKind,
    pub value: String,
}

impl IoDescriptor {
    pub fn url(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IoKind::Url,
            value: value.into(),
        }
    }

    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IoKind::Inline,
            value: value.into(),
        }
    }
}

/// Final result of a cluster job, kept verbatim on the run for diagnostics.
///
/// Keys the orchestrator does not interpret are retained in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub exit_code: i32,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub outputs_base_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobResult {
    pub fn new(
        exit_code: i32,
        outputs: impl IntoIterator<Item = impl Into<String>>,
        outputs_base_url: impl Into<String>,
    ) -> Self {
        Self {
            exit_code,
            outputs: outputs.into_iter().map(Into::into).collect(),
            outputs_base_url: outputs_base_url.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Pair each output name with its location under `outputs_base_url`.
    pub fn output_locations(&self) -> Vec<IoDescriptor> {
        self.outputs
            .iter()
            .map(|name| IoDescriptor::url(name, format!("{}{}", self.outputs_base_url, name)))
            .collect()
    }
}

/// One execution attempt of a workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub workflow_id: WorkflowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub inputs: Vec<IoDescriptor>,
    #[serde(default)]
    pub outputs: Vec<IoDescriptor>,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub canceling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_result: Option<JobResult>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
}

impl Run {
    /// A freshly submitted run, already `RUNNING`.
    pub fn running(
        id: RunId,
        workflow_id: WorkflowKind,
        email: Option<String>,
        inputs: Vec<IoDescriptor>,
    ) -> Self {
        Self {
            id,
            workflow_id,
            email,
            inputs,
            outputs: Vec::new(),
            status: RunStatus::Running,
            canceling: false,
            job_result: None,
            created: Utc::now(),
            ended: None,
        }
    }

    fn transition(&mut self, to: RunStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                run_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to.is_terminal() {
            self.ended = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a finished job. Outputs are only attached on success.
    pub fn apply_result(&mut self, result: JobResult) -> Result<RunStatus, TransitionError> {
        let status = RunStatus::from_exit_code(result.exit_code);
        self.transition(status)?;
        if status == RunStatus::Completed {
            self.outputs = result.output_locations();
        }
        self.job_result = Some(result);
        Ok(status)
    }

    /// Finish the run as `ERROR` without a job result.
    pub fn mark_error(&mut self) -> Result<(), TransitionError> {
        self.transition(RunStatus::Error)
    }

    pub fn request_cancel(&mut self) -> Result<(), TransitionError> {
        if self.status != RunStatus::Running {
            return Err(TransitionError {
                run_id: self.id.clone(),
                from: self.status,
                to: RunStatus::Canceled,
            });
        }
        self.canceling = true;
        Ok(())
    }

    pub fn acknowledge_cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(RunStatus::Canceled)?;
        self.canceling = false;
        Ok(())
    }
}
