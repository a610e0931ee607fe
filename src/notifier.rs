use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{Notification, Notifier, NotifyError};

/// Keeps every notification it is handed. Stands in for push delivery.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn notifications_for(&self, recipient: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            info_type = %notification.info_type,
            title = %notification.title,
            "{}",
            notification.message
        );
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
