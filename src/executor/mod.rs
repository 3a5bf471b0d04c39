//! Task executor capability used by the dispatcher.

pub mod ecs;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::model::{LaunchMode, TaskConfig};
use crate::error::DispatchError;

pub use ecs::EcsTaskExecutor;

/// Environment variable carrying the source bucket.
pub const ENV_BUCKET_NAME: &str = "BUCKET_NAME";
/// Environment variable carrying the source object key.
pub const ENV_KEY: &str = "KEY";

/// Network placement of a launched task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlacement {
    pub assign_public_ip: bool,
    pub security_groups: Vec<String>,
    pub subnets: Vec<String>,
}

/// Everything the executor needs to launch one worker task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub launch_mode: LaunchMode,
    pub placement: NetworkPlacement,
    /// Environment overlay for the worker container, in insertion order.
    pub environment: Vec<(String, String)>,
    /// Deterministic token that lets the executor collapse duplicate launches.
    pub idempotency_token: String,
}

impl DispatchRequest {
    /// Builds the request for one object reference from the task template.
    pub fn for_object(task: &TaskConfig, bucket: &str, key: &str, scope: Option<&str>) -> Self {
        Self {
            cluster: task.cluster.clone(),
            task_definition: task.task_definition.clone(),
            container_name: task.container_name.clone(),
            launch_mode: task.launch_type,
            placement: NetworkPlacement {
                assign_public_ip: task.assign_public_ip,
                security_groups: task.security_groups.clone(),
                subnets: task.subnets.clone(),
            },
            environment: vec![
                (ENV_BUCKET_NAME.to_string(), bucket.to_string()),
                (ENV_KEY.to_string(), key.to_string()),
            ],
            idempotency_token: idempotency_token(bucket, key, scope),
        }
    }

    /// Looks up a value in the environment overlay.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Hex SHA-256 over `bucket`, `key` and an optional scope (the queue message id).
///
/// Fields are NUL-separated so `("a", "b/c")` and `("a/b", "c")` differ.
pub fn idempotency_token(bucket: &str, key: &str, scope: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bucket.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    if let Some(scope) = scope {
        hasher.update([0u8]);
        hasher.update(scope.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Handle to a launched task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskHandle {
    /// Platform identifier of the task, when the platform returned one.
    pub task_arn: Option<String>,
}

/// Launches isolated worker tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Requests one task launch. No retries.
    async fn launch_task(&self, request: &DispatchRequest) -> Result<TaskHandle, DispatchError>;
}
