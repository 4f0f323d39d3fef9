//! Work queue abstraction.
//!
//! Dispatch is at-least-once with no ordering guarantee. Implementations:
//! - `HttpWorkQueue` posts messages to a queue ingestion endpoint
//! - `SimulatedQueue` logs and accepts (no queue configured)
//! - `ChannelQueue` hands messages to an in-process receiver

mod channel;
mod http;

pub use channel::ChannelQueue;
pub use http::{HttpQueueConfig, HttpWorkQueue};

use async_trait::async_trait;

use crate::error::QueueError;
use crate::jobs::DispatchMessage;

/// Delivery channel to the external worker fleet.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Short name for logs and health output.
    fn name(&self) -> &str;

    /// Hand a message to the queue. `Ok` means the queue accepted it.
    async fn send(&self, message: &DispatchMessage) -> Result<(), QueueError>;
}

/// Queue used when none is configured: accepts every message and logs it.
#[derive(Debug, Default)]
pub struct SimulatedQueue;

#[async_trait]
impl WorkQueue for SimulatedQueue {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn send(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        tracing::info!(
            job_id = %message.job_id,
            action = %message.action,
            model_type = %message.job_data.model_type,
            "Queue not configured, simulating dispatch"
        );
        Ok(())
    }
}
