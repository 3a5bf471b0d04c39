//! Job queue capability and notification decoding.

pub mod event;
pub mod sqs;

use async_trait::async_trait;

use crate::error::QueueError;

pub use event::{ObjectRef, QueueEvent};
pub use sqs::SqsJobQueue;

/// One message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Token needed to delete the message. Absent only on malformed responses.
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
}

/// Durable queue the dispatcher polls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Receives at most one message, waiting up to the configured long-poll time.
    async fn receive(&self) -> Result<Option<QueueMessage>, QueueError>;

    /// Deletes a message so it is not redelivered.
    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError>;
}
