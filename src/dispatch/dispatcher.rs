//! Poll, decode, dispatch and acknowledge loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::model::DispatcherConfig;
use crate::error::QueueError;
use crate::executor::{DispatchRequest, TaskExecutor};
use crate::metrics::Metrics;
use crate::queue::{JobQueue, QueueEvent, QueueMessage};

/// Why a message produced no dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Synthetic notification sent when the bucket notification is configured.
    TestEvent,
    /// Body could not be decoded into a known notification.
    Undecodable,
    /// Shutdown was requested before dispatch started.
    ShuttingDown,
}

impl SkipReason {
    /// Metric label for this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestEvent => "test_event",
            Self::Undecodable => "undecodable",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Result of handling one received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageOutcome {
    pub message_id: String,
    /// Task launches that succeeded.
    pub dispatched: usize,
    /// Task launches that failed.
    pub failed: usize,
    /// Whether the message was deleted from the queue.
    pub acknowledged: bool,
    pub skipped: Option<SkipReason>,
}

impl MessageOutcome {
    fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            dispatched: 0,
            failed: 0,
            acknowledged: false,
            skipped: None,
        }
    }
}

/// Result of one poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The long poll returned no message.
    Empty,
    /// A message was received and handled.
    Handled(MessageOutcome),
    /// The receive call failed.
    PollFailed,
}

/// Consumes upload notifications and launches one worker task per object.
pub struct Dispatcher<Q: JobQueue, E: TaskExecutor> {
    queue: Q,
    executor: E,
    config: DispatcherConfig,
    metrics: Option<Arc<Metrics>>,
    shutdown: CancellationToken,
}

impl<Q: JobQueue, E: TaskExecutor> Dispatcher<Q, E> {
    /// Creates a new dispatcher.
    pub fn new(queue: Q, executor: E, config: DispatcherConfig, shutdown: CancellationToken) -> Self {
        Self {
            queue,
            executor,
            config,
            metrics: None,
            shutdown,
        }
    }

    /// Records loop activity into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs the loop until the shutdown token is cancelled.
    ///
    /// A pending long poll or backoff is interrupted by shutdown. A message
    /// already being dispatched is finished and acknowledged first.
    pub async fn run(&self) {
        info!(
            queue_url = %self.config.queue_url,
            cluster = %self.config.task.cluster,
            task_definition = %self.config.task.task_definition,
            "Starting dispatcher"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let received = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.queue.receive() => received,
            };

            if let PollOutcome::PollFailed = self.process(received).await {
                self.backoff().await;
            }
        }

        info!("Dispatcher stopped");
    }

    /// Runs a single poll iteration without backoff.
    pub async fn poll_once(&self) -> PollOutcome {
        let received = self.queue.receive().await;
        self.process(received).await
    }

    async fn process(&self, received: Result<Option<QueueMessage>, QueueError>) -> PollOutcome {
        match received {
            Ok(Some(message)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.messages_received.inc();
                }
                PollOutcome::Handled(self.handle_message(message).await)
            }
            Ok(None) => {
                debug!("No messages received");
                if let Some(metrics) = &self.metrics {
                    metrics.empty_polls.inc();
                }
                PollOutcome::Empty
            }
            Err(e) => {
                error!(error = %e, "Failed to receive from queue");
                if let Some(metrics) = &self.metrics {
                    metrics.poll_errors.inc();
                }
                PollOutcome::PollFailed
            }
        }
    }

    async fn backoff(&self) {
        let delay = Duration::from_secs(self.config.poll_error_backoff_seconds);
        warn!(seconds = delay.as_secs(), "Backing off before next poll");

        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Decodes a message, dispatches every object it references and deletes it.
    pub async fn handle_message(&self, message: QueueMessage) -> MessageOutcome {
        let mut outcome = MessageOutcome::new(&message.message_id);

        let event = match QueueEvent::decode(message.body.as_deref()) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    body = message.body.as_deref().unwrap_or(""),
                    error = %e,
                    "Leaving undecodable message on the queue"
                );
                return self.skip(outcome, SkipReason::Undecodable);
            }
        };

        let refs = match event {
            QueueEvent::Test { service, event } => {
                info!(
                    message_id = %message.message_id,
                    service = %service,
                    event = %event,
                    "Skipping test notification"
                );
                if self.config.delete_test_events {
                    outcome.acknowledged = self.acknowledge(&message).await;
                }
                return self.skip(outcome, SkipReason::TestEvent);
            }
            QueueEvent::Records(refs) => refs,
        };

        if self.shutdown.is_cancelled() {
            warn!(
                message_id = %message.message_id,
                records = refs.len(),
                "Shutdown requested, leaving message for redelivery"
            );
            return self.skip(outcome, SkipReason::ShuttingDown);
        }

        info!(
            message_id = %message.message_id,
            records = refs.len(),
            "Dispatching records"
        );

        for object in &refs {
            let request = DispatchRequest::for_object(
                &self.config.task,
                &object.bucket,
                &object.key,
                Some(&message.message_id),
            );

            let started = Instant::now();
            let result = self.executor.launch_task(&request).await;
            let elapsed = started.elapsed().as_secs_f64();

            if let Some(metrics) = &self.metrics {
                metrics.record_dispatch(result.is_ok(), elapsed);
            }

            match result {
                Ok(handle) => {
                    outcome.dispatched += 1;
                    info!(
                        bucket = %object.bucket,
                        key = %object.key,
                        event_type = object.event_type.as_deref().unwrap_or(""),
                        task_arn = handle.task_arn.as_deref().unwrap_or(""),
                        "Launched transcode task"
                    );
                }
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        bucket = %object.bucket,
                        key = %object.key,
                        error = %e,
                        "Failed to launch transcode task"
                    );
                }
            }
        }

        outcome.acknowledged = self.acknowledge(&message).await;

        info!(
            message_id = %outcome.message_id,
            dispatched = outcome.dispatched,
            failed = outcome.failed,
            acknowledged = outcome.acknowledged,
            "Message handled"
        );

        outcome
    }

    fn skip(&self, mut outcome: MessageOutcome, reason: SkipReason) -> MessageOutcome {
        if let Some(metrics) = &self.metrics {
            metrics.record_skip(reason.as_str());
        }
        outcome.skipped = Some(reason);
        outcome
    }

    /// Deletes the message. Failures are logged only; the message is redelivered.
    async fn acknowledge(&self, message: &QueueMessage) -> bool {
        let result = self.queue.delete(message).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_ack(result.is_ok());
        }

        match result {
            Ok(()) => {
                debug!(message_id = %message.message_id, "Deleted message");
                true
            }
            Err(e) => {
                error!(message_id = %message.message_id, error = %e, "Failed to delete message");
                false
            }
        }
    }
}
