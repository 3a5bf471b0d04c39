//! Upload of a job's output directory to the destination bucket.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::model::{UploadConfig, UploadMode};
use crate::error::UploadError;
use crate::storage::{BlobStore, CompletedPart};

/// One object written to the destination bucket.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub size: u64,
    /// Number of parts, `None` for a single put.
    pub parts: Option<usize>,
}

/// A file that could not be uploaded in best-effort mode.
#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub file: PathBuf,
    pub error: String,
}

/// Result of uploading a whole directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub uploaded: Vec<UploadedObject>,
    pub failed: Vec<FailedUpload>,
}

impl UploadSummary {
    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded.iter().map(|o| o.size).sum()
    }
}

/// Destination key of a local file under the job prefix.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    format!("{}/{}", prefix, file_name)
}

/// Content type by file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        _ => "application/octet-stream",
    }
}

/// Number of parts a file of `size` bytes is split into.
pub fn part_count(size: u64, part_size: u64) -> u64 {
    if size == 0 {
        return 1;
    }
    size.div_ceil(part_size)
}

/// Uploads files through a [`BlobStore`].
pub struct Uploader<S: BlobStore + ?Sized> {
    store: Arc<S>,
    config: UploadConfig,
    deadline: Option<Instant>,
}

impl<S: BlobStore + ?Sized> Uploader<S> {
    pub fn new(store: Arc<S>, config: UploadConfig) -> Self {
        Self {
            store,
            config,
            deadline: None,
        }
    }

    /// Stops store calls at `deadline` with [`UploadError::DeadlineExceeded`].
    /// A multipart session open at that point is aborted.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Uploads every regular file directly inside `dir`, in file-name order.
    pub async fn upload_dir(
        &self,
        dir: &Path,
        bucket: &str,
        prefix: &str,
    ) -> Result<UploadSummary, UploadError> {
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .collect();

        info!(
            bucket = %bucket,
            prefix = %prefix,
            files = files.len(),
            mode = ?self.config.mode,
            "Uploading output directory"
        );

        let mut summary = UploadSummary::default();

        for file in files {
            match self.upload_file(&file, bucket, prefix).await {
                Ok(object) => summary.uploaded.push(object),
                Err(UploadError::DeadlineExceeded) => {
                    error!(file = ?file, "Upload reached the job deadline");
                    return Err(UploadError::DeadlineExceeded);
                }
                Err(e) => match self.config.mode {
                    UploadMode::Strict => {
                        error!(file = ?file, error = %e, "Upload failed, aborting job");
                        return Err(e);
                    }
                    UploadMode::BestEffort => {
                        error!(file = ?file, error = %e, "Upload failed, continuing");
                        summary.failed.push(FailedUpload {
                            file,
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        info!(
            uploaded = summary.uploaded.len(),
            failed = summary.failed.len(),
            bytes = summary.bytes_uploaded(),
            "Upload finished"
        );

        Ok(summary)
    }

    /// Uploads one file, picking a single put or a multipart session by size.
    pub async fn upload_file(
        &self,
        path: &Path,
        bucket: &str,
        prefix: &str,
    ) -> Result<UploadedObject, UploadError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key(prefix, &file_name);
        let content_type = content_type_for(path);

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|source| UploadError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        if size < self.config.multipart_threshold_bytes {
            let body = tokio::fs::read(path)
                .await
                .map_err(|source| UploadError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

            self.within_deadline(async {
                self.store
                    .put(bucket, &key, Bytes::from(body), content_type)
                    .await
                    .map_err(|source| UploadError::Storage {
                        key: key.clone(),
                        source,
                    })
            })
            .await?;

            debug!(key = %key, size, "Uploaded file");
            return Ok(UploadedObject {
                key,
                size,
                parts: None,
            });
        }

        let parts = self
            .upload_multipart(path, size, bucket, &key, content_type)
            .await?;

        info!(key = %key, size, parts, "Uploaded file in parts");
        Ok(UploadedObject {
            key,
            size,
            parts: Some(parts),
        })
    }

    async fn upload_multipart(
        &self,
        path: &Path,
        size: u64,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<usize, UploadError> {
        let upload_id = self
            .within_deadline(async {
                self.store
                    .create_multipart(bucket, key, content_type)
                    .await
                    .map_err(|source| UploadError::Storage {
                        key: key.to_string(),
                        source,
                    })
            })
            .await?;

        let result = self
            .within_deadline(async {
                let parts = self.send_parts(path, size, bucket, key, &upload_id).await?;
                let count = parts.len();
                self.store
                    .complete_multipart(bucket, key, &upload_id, parts)
                    .await
                    .map_err(|source| UploadError::Storage {
                        key: key.to_string(),
                        source,
                    })?;
                Ok::<_, UploadError>(count)
            })
            .await;

        if result.is_err() {
            self.abort(bucket, key, &upload_id).await;
        }
        result
    }

    async fn send_parts(
        &self,
        path: &Path,
        size: u64,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let read_err = |source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).await.map_err(read_err)?;
        let mut parts =
            Vec::with_capacity(part_count(size, self.config.part_size_bytes) as usize);
        let mut part_number: i32 = 1;

        loop {
            let mut chunk = Vec::with_capacity(self.config.part_size_bytes as usize);
            let read = (&mut file)
                .take(self.config.part_size_bytes)
                .read_to_end(&mut chunk)
                .await
                .map_err(read_err)?;

            if read == 0 && !parts.is_empty() {
                break;
            }

            let part = self
                .store
                .upload_part(bucket, key, upload_id, part_number, Bytes::from(chunk))
                .await
                .map_err(|source| UploadError::Part {
                    key: key.to_string(),
                    part_number,
                    source,
                })?;

            debug!(key = %key, part_number, bytes = read, "Uploaded part");
            parts.push(part);

            if (read as u64) < self.config.part_size_bytes {
                break;
            }
            part_number += 1;
        }

        Ok(parts)
    }

    async fn within_deadline<T, F>(&self, operation: F) -> Result<T, UploadError>
    where
        F: Future<Output = Result<T, UploadError>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, operation)
                .await
                .unwrap_or(Err(UploadError::DeadlineExceeded)),
            None => operation.await,
        }
    }

    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(e) = self.store.abort_multipart(bucket, key, upload_id).await {
            warn!(key = %key, upload_id = %upload_id, error = %e, "Failed to abort multipart upload");
        }
    }
}
