//! HLS Transcode Pipeline - queue-driven dispatch of isolated HLS transcode tasks.
//!
//! The dispatcher turns upload notifications into one worker task per object.
//! The worker fetches the source, encodes a fixed rendition ladder with ffmpeg,
//! writes a master playlist and uploads everything to the destination bucket.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod storage;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::{Cli, Commands, TranscodeArgs};
use crate::config::model::AwsConfig;
use crate::config::Role;
use crate::dispatch::Dispatcher;
use crate::encoder::{FfmpegEncoder, TranscodeJob, TranscodeWorker};
use crate::executor::EcsTaskExecutor;
use crate::metrics::{Metrics, MetricsServer};
use crate::queue::SqsJobQueue;
use crate::storage::S3BlobStore;

/// Runs the pipeline with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Dispatch => run_dispatcher(config_path).await,
        Commands::Transcode(args) => run_worker(config_path, args).await,
        Commands::ConfigValidate { role } => validate_config(config_path, role.into()),
        Commands::ConfigShow => show_config(config_path),
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Loads the shared AWS configuration for every client.
async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(aws.region.clone()))
        .load()
        .await
}

/// Runs the queue consumer until Ctrl+C or SIGTERM.
async fn run_dispatcher(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_and_validate(config_path, Role::Dispatcher)?;
    info!("Configuration loaded and validated");

    let sdk_config = load_sdk_config(&config.global.aws).await;
    let dispatcher_config = config.dispatcher.clone();

    let queue = SqsJobQueue::new(
        &sdk_config,
        dispatcher_config.queue_url.clone(),
        dispatcher_config.wait_time_seconds,
    );
    let executor = EcsTaskExecutor::new(&sdk_config);

    let shutdown = CancellationToken::new();
    let mut dispatcher = Dispatcher::new(queue, executor, dispatcher_config, shutdown.clone());

    let mut metrics_task = None;
    if config.global.prometheus.enabled {
        let metrics = Arc::new(Metrics::new()?);
        let server = MetricsServer::new(Arc::clone(&metrics), config.global.prometheus.port);
        let token = shutdown.clone();
        metrics_task = Some(tokio::spawn(async move {
            if let Err(e) = server.start(token).await {
                error!(error = %e, "Prometheus server failed");
            }
        }));
        dispatcher = dispatcher.with_metrics(metrics);
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    dispatcher.run().await;

    shutdown.cancel();
    if let Some(task) = metrics_task {
        join_background("metrics server", task).await;
    }

    Ok(())
}

/// Waits for a background task, logging a panic or cancellation instead of
/// propagating it. Returns whether the task finished normally.
async fn join_background(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!(task = name, error = %e, "Background task did not finish cleanly");
            false
        }
    }
}

/// Runs one transcode job and exits.
async fn run_worker(config_path: Option<&Path>, args: TranscodeArgs) -> Result<()> {
    let config = config::load_and_validate(config_path, Role::Worker)?;

    let sdk_config = load_sdk_config(&config.global.aws).await;
    let store = Arc::new(S3BlobStore::new(&sdk_config, &config.global.aws));

    let encoder = FfmpegEncoder::new(&config.worker.ffmpeg_path);
    encoder
        .check_available()
        .await
        .context("FFmpeg is not available")?;

    let job = TranscodeJob {
        source_bucket: args.bucket,
        key: args.key,
        destination_bucket: args
            .destination_bucket
            .unwrap_or_else(|| config.worker.destination_bucket.clone()),
    };

    let worker = TranscodeWorker::new(store, encoder, config.worker.clone());
    let report = worker
        .run(&job)
        .await
        .with_context(|| format!("Transcode of {}/{} failed", job.source_bucket, job.key))?;

    info!(
        report = %serde_json::to_string(&report)?,
        "Transcode report"
    );

    Ok(())
}

/// Validates the configuration file and prints a report.
fn validate_config(config_path: Option<&Path>, role: Role) -> Result<()> {
    let config = config::load(config_path)?;
    let result = validation::validate_config(&config, role);

    println!("{}", validation::report::format_report(&result));

    if !result.is_valid() {
        anyhow::bail!(error::ConfigError::ValidationFailed {
            error_count: result.error_count()
        });
    }

    Ok(())
}

/// Displays the effective configuration.
fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = config::load(config_path)?;
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
