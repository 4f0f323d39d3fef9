//! In-process queue over a tokio channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::QueueError;
use crate::jobs::DispatchMessage;
use crate::queue::WorkQueue;

/// Queue that forwards messages to an in-process consumer.
///
/// `send` waits for channel capacity; it fails with `Closed` once the
/// receiver is dropped.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::Sender<DispatchMessage>,
}

impl ChannelQueue {
    /// Create a queue and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DispatchMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WorkQueue for ChannelQueue {
    fn name(&self) -> &str {
        "channel"
    }

    async fn send(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        self.tx
            .send(message.clone())
            .await
            .map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::jobs::{Hyperparameters, Job, JobStatus};

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            owner: Some("u1".into()),
            name: "grasp".into(),
            model_type: "policy_network".into(),
            dataset_path: Some("s3://bucket/demo".into()),
            hyperparameters: Hyperparameters::new(),
            status: JobStatus::Pending,
            dispatch_reference: None,
            error_message: None,
            training_logs: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_send_delivers() {
        let (queue, mut rx) = ChannelQueue::new(4);
        let msg = DispatchMessage::start_training(&job());
        queue.send(&msg).await.unwrap();
        assert_eq!(rx.recv().await, Some(msg));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (queue, rx) = ChannelQueue::new(4);
        drop(rx);
        let msg = DispatchMessage::start_training(&job());
        assert!(matches!(queue.send(&msg).await, Err(QueueError::Closed)));
    }
}
