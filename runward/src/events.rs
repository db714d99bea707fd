use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::run::{RunId, RunStatus};
use crate::workflow::WorkflowKind;

/// Metadata envelope attached to every run event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub event_id: Uuid,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(run_id: RunId) -> Self {
        Self {
            version: 1,
            event_id: Uuid::now_v7(),
            run_id,
            timestamp: Utc::now(),
        }
    }
}

/// Run lifecycle event with metadata and payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunEvent {
    pub meta: EventMeta,
    pub payload: RunEventPayload,
}

impl RunEvent {
    pub fn new(run_id: RunId, payload: RunEventPayload) -> Self {
        Self {
            meta: EventMeta::new(run_id),
            payload,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.meta.run_id
    }
}

/// Event payload emitted for run lifecycle transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RunEventPayload {
    /// Run was submitted and persisted as running.
    Launched { workflow: WorkflowKind },
    /// A job monitor started awaiting the run's result.
    MonitorAttached { recovered: bool },
    /// The monitor wrote the run's terminal status.
    Finalized { status: RunStatus },
    /// The monitor resolved but found the run already terminal and left it alone.
    FinalizeSkipped { status: RunStatus },
    /// The awaiting call failed; the run stays running until recovered.
    MonitorFailed { error: String },
    /// Cancellation was requested.
    CancelRequested,
    /// Cancellation was acknowledged.
    Canceled,
}

/// Trait for publishing run lifecycle events.
#[async_trait]
pub trait RunEventPublisher: Send + Sync {
    /// Publish a run event.
    async fn publish(&self, event: RunEvent) -> anyhow::Result<()>;
    /// Subscribe to run events.
    fn subscribe_runs(&self) -> broadcast::Receiver<RunEvent>;
}

/// In-process event bus using a tokio broadcast channel.
///
/// Publishing never blocks. A subscriber that falls more than `capacity`
/// events behind receives `RecvError::Lagged` and skips ahead; with no
/// subscribers events are dropped.
#[derive(Clone)]
pub struct InProcEventBus {
    sender: broadcast::Sender<RunEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    /// Create a new event bus buffering up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn publish_run(&self, event: RunEvent) -> anyhow::Result<()> {
        let _ = self.sender.send(event);
        Ok(())
    }

    pub fn subscribe_run_events(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl RunEventPublisher for InProcEventBus {
    async fn publish(&self, event: RunEvent) -> anyhow::Result<()> {
        self.publish_run(event)
    }

    fn subscribe_runs(&self) -> broadcast::Receiver<RunEvent> {
        self.subscribe_run_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InProcEventBus::new(4);
        bus.publish(RunEvent::new(RunId::from("r"), RunEventPayload::CancelRequested))
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = InProcEventBus::new(8);
        let mut rx1 = bus.subscribe_runs();
        let mut rx2 = bus.subscribe_runs();

        bus.publish(RunEvent::new(
            RunId::from("r1"),
            RunEventPayload::Finalized {
                status: RunStatus::Completed,
            },
        ))
        .await
        .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out")
                .expect("closed");
            assert_eq!(event.run_id().as_str(), "r1");
            assert_eq!(
                event.payload,
                RunEventPayload::Finalized {
                    status: RunStatus::Completed
                }
            );
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = InProcEventBus::new(2);
        let mut rx = bus.subscribe_runs();
        for i in 0..5 {
            bus.publish_run(RunEvent::new(
                RunId::from(format!("r{i}")),
                RunEventPayload::Canceled,
            ))
            .unwrap();
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
