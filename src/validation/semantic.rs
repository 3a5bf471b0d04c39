//! Semantic validation for configuration values.

use crate::config::model::{DispatcherConfig, GlobalConfig, LaunchMode, WorkerConfig, MIN_PART_SIZE};

use super::{ValidationIssue, ValidationResult};

/// Upper bound the queue accepts for a long poll.
const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// Largest single part the object store accepts.
const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Validates settings shared by every role.
pub fn validate_global(global: &GlobalConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if global.aws.region.trim().is_empty() {
        result.add(ValidationIssue::error("global.aws.region", "Region must not be empty"));
    }

    if global.prometheus.enabled && global.prometheus.port == 0 {
        result.add(ValidationIssue::error(
            "global.prometheus.port",
            "Prometheus port must be non-zero when metrics are enabled",
        ));
    }

    result
}

/// Validates the queue consumer and task placement settings.
pub fn validate_dispatcher(dispatcher: &DispatcherConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if dispatcher.queue_url.trim().is_empty() {
        result.add(
            ValidationIssue::error("dispatcher.queue_url", "Queue URL is required")
                .with_suggestion("Set dispatcher.queue_url to the notification queue URL"),
        );
    }

    if !(0..=MAX_WAIT_TIME_SECONDS).contains(&dispatcher.wait_time_seconds) {
        result.add(
            ValidationIssue::error(
                "dispatcher.wait_time_seconds",
                format!("Wait time {} is out of range", dispatcher.wait_time_seconds),
            )
            .with_suggestion(format!("Wait time must be between 0 and {}", MAX_WAIT_TIME_SECONDS)),
        );
    }

    if dispatcher.poll_error_backoff_seconds == 0 {
        result.add(ValidationIssue::warning(
            "dispatcher.poll_error_backoff_seconds",
            "Zero backoff retries a failing queue in a tight loop",
        ));
    }

    let task = &dispatcher.task;

    for (field, value) in [
        ("cluster", &task.cluster),
        ("task_definition", &task.task_definition),
        ("container_name", &task.container_name),
    ] {
        if value.trim().is_empty() {
            result.add(ValidationIssue::error(
                format!("dispatcher.task.{}", field),
                format!("Task {} is required", field.replace('_', " ")),
            ));
        }
    }

    if task.launch_type == LaunchMode::Fargate && task.subnets.is_empty() {
        result.add(
            ValidationIssue::error(
                "dispatcher.task.subnets",
                "Fargate tasks need at least one subnet",
            )
            .with_suggestion("List the subnets the worker tasks may run in"),
        );
    }

    if task.security_groups.is_empty() {
        result.add(ValidationIssue::warning(
            "dispatcher.task.security_groups",
            "No security groups set, the VPC default group applies",
        ));
    }

    result
}

/// Validates the transcode worker settings.
pub fn validate_worker(worker: &WorkerConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if worker.destination_bucket.trim().is_empty() {
        result.add(ValidationIssue::error(
            "worker.destination_bucket",
            "Destination bucket is required",
        ));
    }

    if worker.job_timeout_seconds == 0 {
        result.add(ValidationIssue::error(
            "worker.job_timeout_seconds",
            "Job timeout must be at least 1 second",
        ));
    }

    let upload = &worker.upload;

    if upload.part_size_bytes < MIN_PART_SIZE || upload.part_size_bytes > MAX_PART_SIZE {
        result.add(
            ValidationIssue::error(
                "worker.upload.part_size_bytes",
                format!("Part size {} is out of range", upload.part_size_bytes),
            )
            .with_suggestion(format!(
                "Part size must be between {} and {} bytes",
                MIN_PART_SIZE, MAX_PART_SIZE
            )),
        );
    }

    if upload.multipart_threshold_bytes == 0 {
        result.add(ValidationIssue::error(
            "worker.upload.multipart_threshold_bytes",
            "Threshold must be non-zero",
        ));
    }

    result
}
