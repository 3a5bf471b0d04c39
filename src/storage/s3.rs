//! S3 implementation of the blob store.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info};

use super::{BlobReader, BlobStore, CompletedPart};
use crate::config::model::AwsConfig;
use crate::error::StorageError;

/// Blob store backed by S3 or an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    /// Builds a client from the shared SDK config plus endpoint overrides.
    pub fn new(sdk_config: &SdkConfig, aws: &AwsConfig) -> Self {
        let mut builder =
            aws_sdk_s3::config::Builder::from(sdk_config).force_path_style(aws.force_path_style);

        if let Some(endpoint) = &aws.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        info!(endpoint = ?aws.endpoint_url, "S3 client configured");

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

fn request_failed(bucket: &str, key: &str, err: impl std::error::Error) -> StorageError {
    StorageError::RequestFailed {
        bucket: bucket.to_string(),
        key: key.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

fn missing(bucket: &str, key: &str, field: &'static str) -> StorageError {
    StorageError::MissingField {
        bucket: bucket.to_string(),
        key: key.to_string(),
        field,
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<BlobReader, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    request_failed(bucket, key, e)
                }
            })?;

        debug!(bucket, key, content_length = ?output.content_length(), "Object opened");

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| request_failed(bucket, key, e))?;

        Ok(())
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| request_failed(bucket, key, e))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| missing(bucket, key, "upload_id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart, StorageError> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| request_failed(bucket, key, e))?;

        let e_tag = output.e_tag().ok_or_else(|| missing(bucket, key, "e_tag"))?;

        Ok(CompletedPart {
            part_number,
            e_tag: e_tag.to_string(),
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let parts = parts
            .into_iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .e_tag(p.e_tag)
                    .part_number(p.part_number)
                    .build()
            })
            .collect();

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| request_failed(bucket, key, e))?;

        Ok(())
    }

    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| request_failed(bucket, key, e))?;

        Ok(())
    }
}
