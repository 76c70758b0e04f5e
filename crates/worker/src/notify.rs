//! Outbound user notification channel.

use std::sync::Arc;

use async_trait::async_trait;
use common::{TransactionId, UserId};
use domain::TargetPaymentStatus;
use tokio::sync::RwLock;

use crate::error::{Result, WorkerError};

/// A payment-outcome notification to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub outcome: TargetPaymentStatus,
}

/// Delivery boundary for user notifications.
///
/// Delivery is at-least-once; downstream channels are expected to
/// tolerate repeats keyed on the transaction id.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<()>;
}

/// In-memory channel recording deliveries, with fault injection.
#[derive(Clone, Default)]
pub struct InMemoryNotificationChannel {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail_next: Arc<RwLock<u32>>,
}

impl InMemoryNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` sends fail.
    pub async fn fail_next(&self, count: u32) {
        *self.fail_next.write().await = count;
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl NotificationChannel for InMemoryNotificationChannel {
    async fn send(&self, notification: Notification) -> Result<()> {
        let mut fail_next = self.fail_next.write().await;
        if *fail_next > 0 {
            *fail_next -= 1;
            return Err(WorkerError::Notify(
                "simulated delivery failure".to_string(),
            ));
        }
        drop(fail_next);
        self.sent.write().await.push(notification);
        Ok(())
    }
}
