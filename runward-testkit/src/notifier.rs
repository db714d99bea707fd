use async_trait::async_trait;
use parking_lot::Mutex;
use runward::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Notifier that records every delivery attempt.
///
/// With [`failing`](Self::failing) each attempt is recorded and then
/// reported as failed.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<AtomicBool>,
    delivered: Arc<Notify>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::new();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn sent_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` attempts were recorded. Returns what was
    /// recorded when the wait ended, whether or not `count` was reached.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<Notification> {
        let _ = tokio::time::timeout(limit, async {
            loop {
                let notified = self.delivered.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.sent.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.sent()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        let to = notification.to.clone();
        self.sent.lock().push(notification);
        self.delivered.notify_waiters();

        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::new(to, anyhow::anyhow!("smtp unavailable")));
        }
        Ok(())
    }
}
