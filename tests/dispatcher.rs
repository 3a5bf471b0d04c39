//! Dispatcher loop against an in-memory queue and a recording executor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeEncoder, MemoryQueue, MemoryStore, RecordingExecutor};
use hls_transcode_pipeline::config::model::{AppConfig, DispatcherConfig, WorkerConfig};
use hls_transcode_pipeline::dispatch::{Dispatcher, PollOutcome, SkipReason};
use hls_transcode_pipeline::encoder::{TranscodeJob, TranscodeWorker};
use hls_transcode_pipeline::executor::{idempotency_token, ENV_BUCKET_NAME, ENV_KEY};
use hls_transcode_pipeline::metrics::Metrics;
use tokio_util::sync::CancellationToken;

const CLIP_UPLOAD: &str =
    r#"{"Records":[{"s3":{"bucket":{"name":"src"},"object":{"key":"clip.mp4"}}}]}"#;

const TEST_EVENT: &str = r#"{"Service":"Amazon S3","Event":"s3:TestEvent","Bucket":"src"}"#;

fn dispatcher_config() -> DispatcherConfig {
    let mut config = AppConfig::default().dispatcher;
    config.queue_url = "https://sqs.us-east-1.amazonaws.com/1/transcode-queue".into();
    config.task.cluster = "hls-dev".into();
    config.task.task_definition = "video-transcoder:3".into();
    config.task.security_groups = vec!["sg-1".into()];
    config.task.subnets = vec!["subnet-1".into(), "subnet-2".into()];
    config
}

fn records(keys: &[&str]) -> String {
    let records: Vec<_> = keys
        .iter()
        .map(|key| {
            serde_json::json!({
                "eventName": "ObjectCreated:Put",
                "s3": { "bucket": { "name": "src" }, "object": { "key": key } }
            })
        })
        .collect();
    serde_json::json!({ "Records": records }).to_string()
}

#[tokio::test]
async fn single_upload_launches_one_task_and_deletes_message() {
    let queue = MemoryQueue::with_bodies(&[CLIP_UPLOAD]);
    let executor = RecordingExecutor::default();
    let dispatcher = Dispatcher::new(
        queue.clone(),
        executor.clone(),
        dispatcher_config(),
        CancellationToken::new(),
    );

    let outcome = match dispatcher.poll_once().await {
        PollOutcome::Handled(outcome) => outcome,
        other => panic!("unexpected poll outcome: {other:?}"),
    };

    assert_eq!(outcome.dispatched, 1);
    assert!(outcome.acknowledged);
    assert_eq!(queue.deleted(), vec!["msg-1"]);

    let requests = executor.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.env(ENV_BUCKET_NAME), Some("src"));
    assert_eq!(request.env(ENV_KEY), Some("clip.mp4"));
    assert_eq!(request.cluster, "hls-dev");
    assert_eq!(request.task_definition, "video-transcoder:3");
    assert_eq!(request.container_name, "video-transcoder");
    assert_eq!(request.placement.subnets, vec!["subnet-1", "subnet-2"]);
    assert_eq!(
        request.idempotency_token,
        idempotency_token("src", "clip.mp4", Some("msg-1"))
    );
}

#[tokio::test]
async fn every_reference_is_dispatched_even_when_some_fail() {
    let queue = MemoryQueue::with_bodies(&[&records(&["a.mp4", "b.mp4", "c.mp4", "d.mp4"])]);
    let executor = RecordingExecutor::failing_for(&["b.mp4", "d.mp4"]);
    let dispatcher = Dispatcher::new(
        queue.clone(),
        executor.clone(),
        dispatcher_config(),
        CancellationToken::new(),
    );

    let PollOutcome::Handled(outcome) = dispatcher.poll_once().await else {
        panic!("expected a handled message");
    };

    let keys: Vec<_> = executor
        .requests()
        .iter()
        .map(|r| r.env(ENV_KEY).unwrap_or_default().to_string())
        .collect();
    assert_eq!(keys, vec!["a.mp4", "b.mp4", "c.mp4", "d.mp4"]);
    assert_eq!(outcome.dispatched, 2);
    assert_eq!(outcome.failed, 2);
    assert!(outcome.acknowledged);
    assert_eq!(queue.deleted(), vec!["msg-1"]);
}

#[tokio::test]
async fn test_notification_is_skipped_without_deletion() {
    let queue = MemoryQueue::with_bodies(&[TEST_EVENT]);
    let executor = RecordingExecutor::default();
    let dispatcher = Dispatcher::new(
        queue.clone(),
        executor.clone(),
        dispatcher_config(),
        CancellationToken::new(),
    );

    let PollOutcome::Handled(outcome) = dispatcher.poll_once().await else {
        panic!("expected a handled message");
    };

    assert_eq!(outcome.skipped, Some(SkipReason::TestEvent));
    assert!(executor.requests().is_empty());
    assert!(queue.deleted().is_empty());
}

#[tokio::test]
async fn redelivered_message_reuses_the_launch_token() {
    let queue = MemoryQueue::with_bodies(&[CLIP_UPLOAD]);
    let executor = RecordingExecutor::default();
    let dispatcher = Dispatcher::new(
        queue.clone(),
        executor.clone(),
        dispatcher_config(),
        CancellationToken::new(),
    );

    let message = hls_transcode_pipeline::queue::QueueMessage {
        message_id: "msg-7".into(),
        receipt_handle: Some("receipt-a".into()),
        body: Some(CLIP_UPLOAD.into()),
    };
    dispatcher.handle_message(message.clone()).await;
    dispatcher
        .handle_message(hls_transcode_pipeline::queue::QueueMessage {
            receipt_handle: Some("receipt-b".into()),
            ..message
        })
        .await;

    let requests = executor.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].idempotency_token, requests[1].idempotency_token);
}

#[tokio::test]
async fn run_drains_queue_until_shutdown() {
    let queue = MemoryQueue::with_bodies(&[CLIP_UPLOAD, TEST_EVENT, "garbage", &records(&["x.mov"])]);
    let executor = RecordingExecutor::default();
    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::new().unwrap());

    let dispatcher = Dispatcher::new(
        queue.clone(),
        executor.clone(),
        dispatcher_config(),
        shutdown.clone(),
    )
    .with_metrics(Arc::clone(&metrics));

    let handle = tokio::spawn(async move { dispatcher.run().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.pending() > 0 || executor.requests().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue was not drained");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap();

    assert_eq!(executor.requests().len(), 2);
    assert_eq!(queue.deleted(), vec!["msg-1", "msg-4"]);

    let text = metrics.gather();
    assert!(text.contains("dispatch_messages_received_total 4"));
    assert!(text.contains(r#"dispatch_messages_skipped_total{reason="test_event"} 1"#));
    assert!(text.contains(r#"dispatch_messages_skipped_total{reason="undecodable"} 1"#));
}

#[tokio::test]
async fn dispatched_environment_drives_the_worker_end_to_end() {
    let queue = MemoryQueue::with_bodies(&[CLIP_UPLOAD]);
    let executor = RecordingExecutor::default();
    let dispatcher = Dispatcher::new(
        queue.clone(),
        executor.clone(),
        dispatcher_config(),
        CancellationToken::new(),
    );
    dispatcher.poll_once().await;

    let request = executor.requests().remove(0);
    let job = TranscodeJob {
        source_bucket: request.env(ENV_BUCKET_NAME).unwrap().to_string(),
        key: request.env(ENV_KEY).unwrap().to_string(),
        destination_bucket: "video-transcode-prod".to_string(),
    };

    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert("src", "clip.mp4", b"source bytes");

    let mut worker_config = WorkerConfig::default();
    worker_config.scratch_dir = scratch.path().to_path_buf();

    let worker = TranscodeWorker::new(Arc::clone(&store), FakeEncoder::new(), worker_config);
    worker.run(&job).await.unwrap();

    let keys = store.keys("video-transcode-prod");
    for expected in [
        "clip_mp4/clip_mp4_320x180.m3u8",
        "clip_mp4/clip_mp4_854x480.m3u8",
        "clip_mp4/clip_mp4_1280x720.m3u8",
        "clip_mp4/clip_mp4_master.m3u8",
    ] {
        assert!(keys.contains(&expected.to_string()), "missing {expected}");
    }
}
