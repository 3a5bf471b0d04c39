//! SQS implementation of the job queue.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;

use super::{JobQueue, QueueMessage};
use crate::error::QueueError;

/// Receives one message per call with a bounded long poll.
#[derive(Clone)]
pub struct SqsJobQueue {
    client: Client,
    queue_url: String,
    wait_time_seconds: i32,
}

impl SqsJobQueue {
    pub fn new(sdk_config: &SdkConfig, queue_url: impl Into<String>, wait_time_seconds: i32) -> Self {
        Self {
            client: Client::new(sdk_config),
            queue_url: queue_url.into(),
            wait_time_seconds,
        }
    }
}

#[async_trait]
impl JobQueue for SqsJobQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.wait_time_seconds)
            .send()
            .await
            .map_err(|e| QueueError::Receive {
                queue_url: self.queue_url.clone(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        Ok(output.messages().first().map(|m| QueueMessage {
            message_id: m.message_id().unwrap_or("unknown").to_string(),
            receipt_handle: m.receipt_handle().map(str::to_string),
            body: m.body().map(str::to_string),
        }))
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let receipt_handle =
            message
                .receipt_handle
                .as_deref()
                .ok_or_else(|| QueueError::MissingReceiptHandle {
                    message_id: message.message_id.clone(),
                })?;

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete {
                message_id: message.message_id.clone(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        Ok(())
    }
}
