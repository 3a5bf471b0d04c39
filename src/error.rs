//! Error types for the transcode pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// Job queue errors. `Receive` is the poll-side failure, `Delete` the ack side.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to receive from queue '{queue_url}': {message}")]
    Receive { queue_url: String, message: String },

    #[error("Failed to delete message {message_id}: {message}")]
    Delete { message_id: String, message: String },

    #[error("Message {message_id} has no receipt handle")]
    MissingReceiptHandle { message_id: String },
}

/// Queue message decoding errors.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("Message body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unsupported notification: service={service}, event={event}")]
    UnsupportedNotification { service: String, event: String },

    #[error("Message does not describe any known notification shape")]
    UnknownShape,
}

/// Task launch errors for a single object reference.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to launch task for {bucket}/{key}: {message}")]
    LaunchFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Task launch for {bucket}/{key} was rejected: {reason}")]
    Rejected {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Invalid task placement: {0}")]
    InvalidPlacement(String),
}

/// Blob store transport errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("Request for {bucket}/{key} failed: {message}")]
    RequestFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Response for {bucket}/{key} is missing '{field}'")]
    MissingField {
        bucket: String,
        key: String,
        field: &'static str,
    },
}

/// Source download failures. Always fatal for a job.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to download {bucket}/{key}: {source}")]
    Download {
        bucket: String,
        key: String,
        source: StorageError,
    },

    #[error("Failed to write source to '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Encoder process errors for one rendition pass.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("FFmpeg failed with exit code {code}: {stderr}")]
    FfmpegFailed { code: i32, stderr: String },

    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Output verification failed: {0}")]
    VerificationFailed(String),
}

/// A rendition pass that failed, tagged with its resolution.
#[derive(Error, Debug)]
#[error("Transcode failed for {resolution}: {source}")]
pub struct TranscodeError {
    pub resolution: String,
    pub source: EncoderError,
}

/// Per-file upload errors.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Upload of '{key}' failed: {source}")]
    Storage { key: String, source: StorageError },

    #[error("Multipart upload of '{key}' failed at part {part_number}: {source}")]
    Part {
        key: String,
        part_number: i32,
        source: StorageError,
    },

    #[error("Upload stopped at the job deadline")]
    DeadlineExceeded,
}

/// Errors that abort a worker job.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Fetch phase failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Transcode phase failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Upload phase failed: {0}")]
    Upload(#[from] UploadError),

    #[error("I/O failure at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Job exceeded its deadline of {seconds} seconds")]
    Timeout { seconds: u64 },
}

/// Metrics exporter errors.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("Metrics server failed: {0}")]
    Server(String),
}
