//! ECS implementation of the task executor.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use aws_sdk_ecs::Client;
use tracing::debug;

use super::{DispatchRequest, TaskExecutor, TaskHandle};
use crate::config::model::LaunchMode;
use crate::error::DispatchError;

/// Launches worker tasks with `RunTask`.
#[derive(Clone)]
pub struct EcsTaskExecutor {
    client: Client,
}

impl EcsTaskExecutor {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

fn launch_type(mode: LaunchMode) -> LaunchType {
    match mode {
        LaunchMode::Fargate => LaunchType::Fargate,
        LaunchMode::Ec2 => LaunchType::Ec2,
    }
}

#[async_trait]
impl TaskExecutor for EcsTaskExecutor {
    async fn launch_task(&self, request: &DispatchRequest) -> Result<TaskHandle, DispatchError> {
        let bucket = request.env(super::ENV_BUCKET_NAME).unwrap_or_default();
        let key = request.env(super::ENV_KEY).unwrap_or_default();

        let vpc = AwsVpcConfiguration::builder()
            .assign_public_ip(if request.placement.assign_public_ip {
                AssignPublicIp::Enabled
            } else {
                AssignPublicIp::Disabled
            })
            .set_security_groups(Some(request.placement.security_groups.clone()))
            .set_subnets(Some(request.placement.subnets.clone()))
            .build()
            .map_err(|e| DispatchError::InvalidPlacement(e.to_string()))?;

        let environment = request
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect();

        let overrides = TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&request.container_name)
                    .set_environment(Some(environment))
                    .build(),
            )
            .build();

        let output = self
            .client
            .run_task()
            .cluster(&request.cluster)
            .task_definition(&request.task_definition)
            .launch_type(launch_type(request.launch_mode))
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            )
            .overrides(overrides)
            .client_token(&request.idempotency_token)
            .send()
            .await
            .map_err(|e| DispatchError::LaunchFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        let task_arn = output
            .tasks()
            .first()
            .and_then(|t| t.task_arn())
            .map(str::to_string);

        if task_arn.is_none() {
            if let Some(failure) = output.failures().first() {
                return Err(DispatchError::Rejected {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: failure
                        .reason()
                        .unwrap_or("no reason given")
                        .to_string(),
                });
            }
        }

        debug!(task_arn = ?task_arn, "RunTask accepted");

        Ok(TaskHandle { task_arn })
    }
}
