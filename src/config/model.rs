//! Configuration data structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure containing all settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global application settings.
    #[serde(default)]
    pub global: GlobalConfig,

    /// Queue consumer and task launch settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Transcode worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Global application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// AWS client settings shared by queue, task and storage clients.
    #[serde(default)]
    pub aws: AwsConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// AWS client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region for every client.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom S3 endpoint (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing. Required by MinIO.
    #[serde(default)]
    pub force_path_style: bool,
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Whether to enable Prometheus metrics endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port for the Prometheus metrics HTTP server.
    #[serde(default = "default_prometheus_port")]
    pub port: u16,
}

/// Queue consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// URL of the job queue.
    #[serde(default)]
    pub queue_url: String,

    /// Long-poll wait per receive call.
    #[serde(default = "default_wait_time")]
    pub wait_time_seconds: i32,

    /// Delay after a failed receive before polling again.
    #[serde(default = "default_poll_backoff")]
    pub poll_error_backoff_seconds: u64,

    /// Delete synthetic test notifications instead of leaving them on the queue.
    #[serde(default)]
    pub delete_test_events: bool,

    /// Where and how worker tasks are launched.
    #[serde(default)]
    pub task: TaskConfig,
}

/// Task launch template and network placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Cluster name or ARN.
    #[serde(default)]
    pub cluster: String,

    /// Task definition family, family:revision, or ARN.
    #[serde(default)]
    pub task_definition: String,

    /// Container that receives the environment overlay.
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Launch mode for the task.
    #[serde(default)]
    pub launch_type: LaunchMode,

    /// Whether the task gets a public IP.
    #[serde(default = "default_true")]
    pub assign_public_ip: bool,

    /// Security group ids.
    #[serde(default)]
    pub security_groups: Vec<String>,

    /// Subnet ids.
    #[serde(default)]
    pub subnets: Vec<String>,
}

/// How the task executor provisions compute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Managed serverless compute.
    #[default]
    Fargate,
    /// Instances registered to the cluster.
    Ec2,
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fargate => write!(f, "fargate"),
            Self::Ec2 => write!(f, "ec2"),
        }
    }
}

/// Transcode worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Bucket that receives the HLS output.
    #[serde(default = "default_destination_bucket")]
    pub destination_bucket: String,

    /// Scratch directory for downloads and encoder output.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// FFmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Deadline for a whole job.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,

    /// Upload behavior.
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Output upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// What a single failed file does to the job.
    #[serde(default)]
    pub mode: UploadMode,

    /// Files at or above this size go through multipart upload.
    #[serde(default = "default_part_size")]
    pub multipart_threshold_bytes: u64,

    /// Size of each multipart chunk. The last chunk may be shorter.
    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,
}

/// Upload failure policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Log the failed file and keep uploading the rest.
    #[default]
    BestEffort,
    /// Fail the job on the first failed file.
    Strict,
}

/// 5 MiB, the smallest part size the object store accepts.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

// Default value functions

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_prometheus_port() -> u16 {
    9090
}

fn default_wait_time() -> i32 {
    10
}

fn default_poll_backoff() -> u64 {
    5
}

fn default_container_name() -> String {
    "video-transcoder".to_string()
}

fn default_destination_bucket() -> String {
    "video-transcode-prod".to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/hls_transcode")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_job_timeout() -> u64 {
    7200
}

fn default_part_size() -> u64 {
    MIN_PART_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_prometheus_port(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            wait_time_seconds: default_wait_time(),
            poll_error_backoff_seconds: default_poll_backoff(),
            delete_test_events: false,
            task: TaskConfig::default(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            task_definition: String::new(),
            container_name: default_container_name(),
            launch_type: LaunchMode::default(),
            assign_public_ip: true,
            security_groups: Vec::new(),
            subnets: Vec::new(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            destination_bucket: default_destination_bucket(),
            scratch_dir: default_scratch_dir(),
            ffmpeg_path: default_ffmpeg_path(),
            job_timeout_seconds: default_job_timeout(),
            upload: UploadConfig::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            mode: UploadMode::default(),
            multipart_threshold_bytes: default_part_size(),
            part_size_bytes: default_part_size(),
        }
    }
}
