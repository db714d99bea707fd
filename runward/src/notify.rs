//! Lifecycle email notifications.
//!
//! Notifications are one-way: the orchestrator hands a [`Notification`] to the
//! [`NotificationDispatcher`] and moves on. Delivery happens on background
//! tasks, and a failed delivery is logged without touching run state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::NotificationError;

/// Which lifecycle transition a notification announces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RunStarted,
    RunEnded,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::RunStarted => "Your Workflow is Running",
            NotificationKind::RunEnded => "Your Workflow Has Ended",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            NotificationKind::RunStarted => "email_thanks",
            NotificationKind::RunEnded => "email_ended",
        }
    }
}

/// A rendered-later email: recipient, subject, template and its variables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub to: String,
    pub subject: String,
    pub template: String,
    pub variables: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, to: impl Into<String>, run_url: impl Into<String>) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("runUrl".to_string(), run_url.into());
        Self {
            kind,
            to: to.into(),
            subject: kind.subject().to_string(),
            template: kind.template().to_string(),
            variables,
        }
    }

    pub fn run_started(to: impl Into<String>, run_url: impl Into<String>) -> Self {
        Self::new(NotificationKind::RunStarted, to, run_url)
    }

    pub fn run_ended(to: impl Into<String>, run_url: impl Into<String>) -> Self {
        Self::new(NotificationKind::RunEnded, to, run_url)
    }

    pub fn run_url(&self) -> Option<&str> {
        self.variables.get("runUrl").map(String::as_str)
    }
}

/// Sends notifications to users. Implemented by the mail integration.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Notifier that only writes each notification to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            template = %notification.template,
            "notification (log only)"
        );
        Ok(())
    }
}

/// Fire-and-forget front for a [`Notifier`].
///
/// `dispatch` never waits on delivery and never fails. Each queued
/// notification is delivered on its own task so one slow recipient does not
/// hold up the others.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl NotificationDispatcher {
    /// Start the delivery loop. Must be called from within a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let notifier = Arc::clone(&notifier);
                tokio::spawn(async move {
                    let kind = notification.kind;
                    let run_url = notification.run_url().unwrap_or_default().to_string();
                    if let Err(err) = notifier.send(notification).await {
                        tracing::error!(
                            ?kind,
                            run_url = %run_url,
                            "failed to send notification: {err}"
                        );
                    }
                });
            }
            tracing::debug!("notification dispatcher closed");
        });

        Self { tx }
    }

    /// Queue a notification for delivery.
    pub fn dispatch(&self, notification: Notification) {
        if let Err(err) = self.tx.send(notification) {
            tracing::error!(
                to = %err.0.to,
                "notification dropped: delivery loop is not running"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    struct ChannelNotifier {
        sent: mpsc::UnboundedSender<Notification>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
            let to = notification.to.clone();
            let _ = self.sent.send(notification);
            if self.fail {
                return Err(NotificationError::new(to, anyhow::anyhow!("mailbox full")));
            }
            Ok(())
        }
    }

    #[test]
    fn test_notification_carries_run_url() {
        let n = Notification::run_ended("u@x.com", "https://apps/workflow/0/r1");
        assert_eq!(n.subject, "Your Workflow Has Ended");
        assert_eq!(n.template, "email_ended");
        assert_eq!(n.run_url(), Some("https://apps/workflow/0/r1"));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::spawn(Arc::new(ChannelNotifier {
            sent: sent_tx,
            fail: false,
        }));

        dispatcher.dispatch(Notification::run_started("u@x.com", "https://apps/r"));

        let delivered = timeout(Duration::from_secs(1), sent_rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
        assert_eq!(delivered.kind, NotificationKind::RunStarted);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_dispatcher() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::spawn(Arc::new(ChannelNotifier {
            sent: sent_tx,
            fail: true,
        }));

        dispatcher.dispatch(Notification::run_started("a@x.com", "u1"));
        dispatcher.dispatch(Notification::run_ended("b@x.com", "u2"));

        let mut recipients = Vec::new();
        for _ in 0..2 {
            let n = timeout(Duration::from_secs(1), sent_rx.recv())
                .await
                .expect("delivery timed out")
                .expect("channel closed");
            recipients.push(n.to);
        }
        recipients.sort();
        assert_eq!(recipients, vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        LogNotifier
            .send(Notification::run_started("u@x.com", "u"))
            .await
            .unwrap();
    }
}
