//! Blob store capability used by the transcode worker.
//!
//! The trait is a pure transport boundary: no retries or backoff live here.

pub mod s3;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::StorageError;

pub use s3::S3BlobStore;

/// Streaming body of a fetched object.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// One finished part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: i32,
    /// Integrity tag returned by the store.
    pub e_tag: String,
}

/// Object store operations the worker depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Opens a streaming read of `bucket/key`.
    async fn get(&self, bucket: &str, key: &str) -> Result<BlobReader, StorageError>;

    /// Stores `body` at `bucket/key` in a single request.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Opens a multipart session and returns its upload id.
    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Uploads one chunk of an open session.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart, StorageError>;

    /// Finalizes a session from its ordered part list.
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError>;

    /// Discards an open session and its uploaded parts.
    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;
}
