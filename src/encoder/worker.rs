//! Transcode worker: fetch, rendition passes, master playlist, upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ffmpeg::{RenditionEncoder, RenditionOutput};
use super::playlist;
use super::rendition::{sanitize_key, RENDITIONS};
use super::upload::{FailedUpload, UploadedObject, Uploader};
use crate::config::model::WorkerConfig;
use crate::error::{FetchError, TranscodeError, UploadError, WorkerError};
use crate::storage::BlobStore;

/// One source object to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub source_bucket: String,
    pub key: String,
    pub destination_bucket: String,
}

impl TranscodeJob {
    /// Output file prefix and destination key prefix.
    pub fn prefix(&self) -> String {
        sanitize_key(&self.key)
    }
}

/// Current phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Downloading the source object.
    Fetching,
    /// Running rendition passes.
    Transcoding,
    /// Writing the master playlist.
    WritingPlaylist,
    /// Uploading the output directory.
    Uploading,
}

/// Rendition entry of a [`JobReport`].
#[derive(Debug, Clone, Serialize)]
pub struct RenditionSummary {
    pub resolution: String,
    pub bandwidth: u64,
    pub playlist: String,
    pub segments: usize,
}

impl From<&RenditionOutput> for RenditionSummary {
    fn from(output: &RenditionOutput) -> Self {
        Self {
            resolution: output.resolution.clone(),
            bandwidth: output.bandwidth,
            playlist: output.playlist_name(),
            segments: output.segments.len(),
        }
    }
}

/// Summary of a finished job, logged as the last event of a run.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub source_bucket: String,
    pub key: String,
    pub destination_bucket: String,
    pub prefix: String,
    pub master_playlist: String,
    pub renditions: Vec<RenditionSummary>,
    pub uploaded: Vec<UploadedObject>,
    pub failed: Vec<FailedUpload>,
    pub bytes_uploaded: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Runs transcode jobs against a blob store and an encoder.
pub struct TranscodeWorker<S: BlobStore + ?Sized, E: RenditionEncoder> {
    store: Arc<S>,
    encoder: E,
    config: WorkerConfig,
}

impl<S: BlobStore + ?Sized, E: RenditionEncoder> TranscodeWorker<S, E> {
    /// Creates a new transcode worker.
    pub fn new(store: Arc<S>, encoder: E, config: WorkerConfig) -> Self {
        Self {
            store,
            encoder,
            config,
        }
    }

    /// Runs one job to completion inside its own scratch directory.
    ///
    /// The scratch directory is removed whatever the outcome. The whole job is
    /// bounded by the configured deadline. On expiry the running encoder
    /// process is killed and an open multipart session is aborted.
    pub async fn run(&self, job: &TranscodeJob) -> Result<JobReport, WorkerError> {
        let job_id = Uuid::new_v4();
        let job_dir = self
            .config
            .scratch_dir
            .join(format!("job_{}", job_id.simple()));

        info!(
            job_id = %job_id,
            bucket = %job.source_bucket,
            key = %job.key,
            destination = %job.destination_bucket,
            "Starting transcode job"
        );

        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|source| WorkerError::Io {
                path: job_dir.clone(),
                source,
            })?;

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.job_timeout_seconds);
        let result = self.execute(job, job_id, &job_dir, deadline).await;

        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            warn!(path = ?job_dir, error = %e, "Failed to remove scratch directory");
        }

        match &result {
            Ok(report) => info!(
                job_id = %job_id,
                uploaded = report.uploaded.len(),
                failed = report.failed.len(),
                duration_seconds = report.duration_seconds,
                "Transcode job completed"
            ),
            Err(e) => error!(job_id = %job_id, error = %e, "Transcode job failed"),
        }

        result
    }

    async fn execute(
        &self,
        job: &TranscodeJob,
        job_id: Uuid,
        job_dir: &Path,
        deadline: tokio::time::Instant,
    ) -> Result<JobReport, WorkerError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let prefix = job.prefix();

        let output_dir = job_dir.join("output");
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| WorkerError::Io {
                path: output_dir.clone(),
                source,
            })?;

        let (outputs, master) = tokio::time::timeout_at(
            deadline,
            self.produce(job, job_id, job_dir, &output_dir, &prefix),
        )
        .await
        .map_err(|_| self.timed_out())??;

        // The uploader enforces the deadline itself and aborts an open session on expiry.
        self.enter(job_id, JobPhase::Uploading);
        let uploader = Uploader::new(Arc::clone(&self.store), self.config.upload.clone())
            .with_deadline(deadline);
        let summary = match uploader
            .upload_dir(&output_dir, &job.destination_bucket, &prefix)
            .await
        {
            Ok(summary) => summary,
            Err(UploadError::DeadlineExceeded) => return Err(self.timed_out()),
            Err(e) => return Err(e.into()),
        };

        Ok(JobReport {
            job_id,
            source_bucket: job.source_bucket.clone(),
            key: job.key.clone(),
            destination_bucket: job.destination_bucket.clone(),
            master_playlist: master
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            prefix,
            renditions: outputs.iter().map(RenditionSummary::from).collect(),
            bytes_uploaded: summary.bytes_uploaded(),
            uploaded: summary.uploaded,
            failed: summary.failed,
            started_at,
            finished_at: Utc::now(),
            duration_seconds: clock.elapsed().as_secs_f64(),
        })
    }

    /// Fetch, rendition passes and master playlist.
    async fn produce(
        &self,
        job: &TranscodeJob,
        job_id: Uuid,
        job_dir: &Path,
        output_dir: &Path,
        prefix: &str,
    ) -> Result<(Vec<RenditionOutput>, PathBuf), WorkerError> {
        self.enter(job_id, JobPhase::Fetching);
        let source = self.fetch(job, job_dir).await?;

        self.enter(job_id, JobPhase::Transcoding);
        let outputs = self.transcode(&source, output_dir, prefix).await?;

        self.enter(job_id, JobPhase::WritingPlaylist);
        let master = playlist::write_master(output_dir, prefix, &outputs)
            .await
            .map_err(|source| WorkerError::Io {
                path: output_dir.join(playlist::master_file_name(prefix)),
                source,
            })?;

        Ok((outputs, master))
    }

    fn timed_out(&self) -> WorkerError {
        WorkerError::Timeout {
            seconds: self.config.job_timeout_seconds,
        }
    }

    fn enter(&self, job_id: Uuid, phase: JobPhase) {
        info!(job_id = %job_id, phase = ?phase, "Entering job phase");
    }

    /// Streams the source object into `job_dir`.
    async fn fetch(&self, job: &TranscodeJob, job_dir: &Path) -> Result<PathBuf, FetchError> {
        let path = job_dir.join(source_file_name(&job.key));

        let mut reader = self
            .store
            .get(&job.source_bucket, &job.key)
            .await
            .map_err(|source| FetchError::Download {
                bucket: job.source_bucket.clone(),
                key: job.key.clone(),
                source,
            })?;

        let write_err = |source| FetchError::Write {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;
        let bytes = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        info!(path = ?path, bytes, "Downloaded source");
        Ok(path)
    }

    /// Runs every rendition pass in ladder order, stopping at the first failure.
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        prefix: &str,
    ) -> Result<Vec<RenditionOutput>, TranscodeError> {
        let mut outputs = Vec::with_capacity(RENDITIONS.len());

        for spec in &RENDITIONS {
            let output = self
                .encoder
                .encode(input, output_dir, prefix, spec)
                .await
                .map_err(|source| TranscodeError {
                    resolution: spec.resolution(),
                    source,
                })?;
            outputs.push(output);
        }

        Ok(outputs)
    }
}

/// Local file name for the downloaded source, keeping the key's extension.
pub fn source_file_name(key: &str) -> String {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("source.{}", ext),
        _ => "source".to_string(),
    }
}
