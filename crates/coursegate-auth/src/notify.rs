//! Delivery of expiry notices.

use std::future::Future;

use coursegate_core::error::{GateError, GateResult};
use coursegate_core::models::notice::{ExpiryNotice, Urgency};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Collaborator that delivers expiry notices (email, queue, ...).
pub trait ExpiryNotifier: Send + Sync {
    fn notify(&self, notice: ExpiryNotice) -> impl Future<Output = GateResult<()>> + Send;
}

/// Writes each notice to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl ExpiryNotifier for TracingNotifier {
    async fn notify(&self, notice: ExpiryNotice) -> GateResult<()> {
        match notice.urgency {
            Urgency::Urgent => warn!(
                identity_id = %notice.identity_id,
                contact = %notice.contact,
                course_ref = %notice.course_ref,
                days_remaining = notice.days_remaining,
                "course access expires within a day"
            ),
            Urgency::Upcoming => info!(
                identity_id = %notice.identity_id,
                contact = %notice.contact,
                course_ref = %notice.course_ref,
                days_remaining = notice.days_remaining,
                "course access expires soon"
            ),
        }
        Ok(())
    }
}

/// Forwards notices into a channel for an out-of-process sender.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<ExpiryNotice>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<ExpiryNotice>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ExpiryNotice>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl ExpiryNotifier for ChannelNotifier {
    async fn notify(&self, notice: ExpiryNotice) -> GateResult<()> {
        self.tx
            .send(notice)
            .await
            .map_err(|_| GateError::Internal("notice channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn notice() -> ExpiryNotice {
        ExpiryNotice {
            identity_id: Uuid::new_v4(),
            contact: "ada@example.com".into(),
            course_ref: "rust-101".into(),
            days_remaining: 1,
            urgency: Urgency::Urgent,
        }
    }

    #[tokio::test]
    async fn channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        let sent = notice();
        notifier.notify(sent.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (notifier, rx) = ChannelNotifier::channel(1);
        drop(rx);
        assert!(matches!(
            notifier.notify(notice()).await,
            Err(GateError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        assert!(TracingNotifier.notify(notice()).await.is_ok());
    }
}
