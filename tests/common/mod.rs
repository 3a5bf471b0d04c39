//! In-memory fakes of the capability traits for integration tests.
//!
//! [`MemoryStore`] keeps objects and multipart sessions in maps,
//! [`FakeEncoder`] writes playlists and segments instead of running ffmpeg,
//! [`MemoryQueue`] and [`RecordingExecutor`] stand in for the queue and the
//! task platform.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use hls_transcode_pipeline::encoder::rendition::{playlist_file_name, RenditionSpec};
use hls_transcode_pipeline::encoder::{RenditionEncoder, RenditionOutput};
use hls_transcode_pipeline::error::{DispatchError, EncoderError, QueueError, StorageError};
use hls_transcode_pipeline::executor::{DispatchRequest, TaskExecutor, TaskHandle};
use hls_transcode_pipeline::queue::{JobQueue, QueueMessage};
use hls_transcode_pipeline::storage::{BlobReader, BlobStore, CompletedPart};

pub const MIB: usize = 1024 * 1024;

struct Session {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

/// Blob store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    sessions: Mutex<HashMap<String, Session>>,
    /// Part numbers sent per key, in call order.
    part_calls: Mutex<HashMap<String, Vec<i32>>>,
    aborted: Mutex<Vec<String>>,
    failing_keys: Mutex<HashSet<String>>,
    part_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
    }

    /// Makes every write to `key` fail.
    pub fn fail_writes_to(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    /// Makes every part upload wait `delay` before it is stored.
    pub fn delay_parts(&self, delay: Duration) {
        *self.part_delay.lock().unwrap() = Some(delay);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Sorted keys stored in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn part_calls(&self, key: &str) -> Vec<i32> {
        self.part_calls
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().unwrap().clone()
    }

    fn check_writable(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(StorageError::RequestFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<BlobReader, StorageError> {
        match self.object(bucket, key) {
            Some(body) => Ok(Box::pin(std::io::Cursor::new(body))),
            None => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.check_writable(bucket, key)?;
        self.insert(bucket, key, &body);
        Ok(())
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let mut sessions = self.sessions.lock().unwrap();
        let upload_id = format!("upload-{}", sessions.len() + 1);
        sessions.insert(
            upload_id.clone(),
            Session {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart, StorageError> {
        self.part_calls
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(part_number);
        let delay = *self.part_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_writable(bucket, key)?;

        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::RequestFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "no such upload".to_string(),
            })?;
        session.parts.insert(part_number, body.to_vec());

        Ok(CompletedPart {
            part_number,
            e_tag: format!("etag-{}", part_number),
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| StorageError::RequestFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "no such upload".to_string(),
            })?;

        let mut body = Vec::new();
        for part in &parts {
            match session.parts.get(&part.part_number) {
                Some(chunk) => body.extend_from_slice(chunk),
                None => {
                    return Err(StorageError::RequestFailed {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        message: format!("missing part {}", part.part_number),
                    })
                }
            }
        }

        self.insert(&session.bucket, &session.key, &body);
        Ok(())
    }

    async fn abort_multipart(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.sessions.lock().unwrap().remove(upload_id);
        self.aborted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Encoder that writes a playlist and fixed-size segments for each pass.
/// Clones share the recorded passes.
#[derive(Clone, Default)]
pub struct FakeEncoder {
    /// Resolutions encoded, in call order.
    pub passes: Arc<Mutex<Vec<String>>>,
    /// Resolution whose pass fails.
    pub fail_at: Option<String>,
    /// Segment size per resolution. Defaults to a few bytes.
    pub segment_sizes: HashMap<String, usize>,
    pub segments_per_pass: usize,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self {
            segments_per_pass: 2,
            ..Self::default()
        }
    }

    pub fn failing_at(resolution: &str) -> Self {
        Self {
            fail_at: Some(resolution.to_string()),
            ..Self::new()
        }
    }

    pub fn with_segment_size(mut self, resolution: &str, size: usize) -> Self {
        self.segment_sizes.insert(resolution.to_string(), size);
        self
    }

    pub fn passes(&self) -> Vec<String> {
        self.passes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenditionEncoder for FakeEncoder {
    async fn encode(
        &self,
        _input: &Path,
        output_dir: &Path,
        prefix: &str,
        spec: &RenditionSpec,
    ) -> Result<RenditionOutput, EncoderError> {
        let resolution = spec.resolution();
        self.passes.lock().unwrap().push(resolution.clone());

        if self.fail_at.as_deref() == Some(resolution.as_str()) {
            return Err(EncoderError::FfmpegFailed {
                code: 1,
                stderr: "Conversion failed!".to_string(),
            });
        }

        let size = self.segment_sizes.get(&resolution).copied().unwrap_or(16);
        let mut segments = Vec::new();
        let mut playlist_body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");

        for index in 0..self.segments_per_pass {
            let name = format!("{}_{}_{:03}.ts", prefix, resolution, index);
            let path = output_dir.join(&name);
            std::fs::write(&path, vec![index as u8; size])
                .map_err(|e| EncoderError::VerificationFailed(e.to_string()))?;
            playlist_body.push_str(&format!("#EXTINF:10.0,\n{}\n", name));
            segments.push(path);
        }
        playlist_body.push_str("#EXT-X-ENDLIST\n");

        let playlist = output_dir.join(playlist_file_name(prefix, spec));
        std::fs::write(&playlist, playlist_body)
            .map_err(|e| EncoderError::VerificationFailed(e.to_string()))?;

        Ok(RenditionOutput {
            resolution,
            bandwidth: spec.bandwidth,
            playlist,
            segments,
        })
    }
}

/// Queue backed by a list of pending messages. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    pending: Arc<Mutex<VecDeque<QueueMessage>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl MemoryQueue {
    pub fn with_bodies(bodies: &[&str]) -> Self {
        let pending = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| QueueMessage {
                message_id: format!("msg-{}", i + 1),
                receipt_handle: Some(format!("receipt-{}", i + 1)),
                body: Some(body.to_string()),
            })
            .collect();
        Self {
            pending: Arc::new(Mutex::new(pending)),
            deleted: Arc::default(),
        }
    }

    /// Message ids deleted so far.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>, QueueError> {
        let next = self.pending.lock().unwrap().pop_front();
        if next.is_none() {
            // Stand-in for the long-poll wait.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(next)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.deleted.lock().unwrap().push(message.message_id.clone());
        Ok(())
    }
}

/// Executor that records every request and fails for chosen keys. Clones share state.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    requests: Arc<Mutex<Vec<DispatchRequest>>>,
    failing_keys: Arc<HashSet<String>>,
}

impl RecordingExecutor {
    pub fn failing_for(keys: &[&str]) -> Self {
        Self {
            requests: Arc::default(),
            failing_keys: Arc::new(keys.iter().map(|k| k.to_string()).collect()),
        }
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn launch_task(&self, request: &DispatchRequest) -> Result<TaskHandle, DispatchError> {
        self.requests.lock().unwrap().push(request.clone());

        let key = request.env("KEY").unwrap_or_default();
        if self.failing_keys.contains(key) {
            return Err(DispatchError::LaunchFailed {
                bucket: request.env("BUCKET_NAME").unwrap_or_default().to_string(),
                key: key.to_string(),
                message: "capacity unavailable".to_string(),
            });
        }

        Ok(TaskHandle {
            task_arn: Some(format!("arn:aws:ecs:task/{}", request.idempotency_token)),
        })
    }
}
