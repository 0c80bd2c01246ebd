//! Fan-out notification sink over a tokio broadcast channel.
//!
//! A web/STOMP layer subscribes and forwards each notification to the
//! tenant's live sessions. Pushing with no subscribers is not an error; the
//! notification is dropped.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use super::{DomainResult, Notification, NotificationSink};

#[derive(Debug, Clone, PartialEq)]
pub struct PushedNotification {
    pub tenant_id: String,
    pub destination: String,
    pub notification: Notification,
}

#[derive(Debug, Clone)]
pub struct BroadcastNotificationSink {
    sender: broadcast::Sender<PushedNotification>,
}

impl BroadcastNotificationSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushedNotification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotificationSink {
    async fn push(
        &self,
        tenant_id: &str,
        destination: &str,
        notification: &Notification,
    ) -> DomainResult<()> {
        let pushed = PushedNotification {
            tenant_id: tenant_id.to_string(),
            destination: destination.to_string(),
            notification: notification.clone(),
        };

        if self.sender.send(pushed).is_err() {
            trace!(tenant_id, destination, "No notification subscribers");
        }
        Ok(())
    }
}
