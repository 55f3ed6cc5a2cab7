// clinic-backup/src/backup/s3_upload.rs
use aws_credential_types::provider::error::CredentialsError;
use aws_sdk_s3 as s3;
use s3::config::http::HttpResponse;
use s3::config::{BehaviorVersion, Region};
use s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use s3::primitives::{ByteStream, Length};
use s3::types::{CompletedMultipartUpload, CompletedPart};
use std::error::Error as StdError;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::errors::UploadError;

/// Files above this size go through multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;
pub const PART_SIZE: u64 = 16 * 1024 * 1024;

/// Error codes S3 (and compatible services) use for credential or
/// permission problems.
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidToken",
    "SignatureDoesNotMatch",
    "TokenRefreshRequired",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Auth,
    Transport,
}

pub(crate) fn classify_failure(
    code: Option<&str>,
    status: Option<u16>,
    credentials_missing: bool,
) -> FailureKind {
    // Credential resolution fails before any request is sent, so there is
    // neither a code nor a status to look at.
    if credentials_missing
        || code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
        || matches!(status, Some(401 | 403))
    {
        return FailureKind::Auth;
    }
    FailureKind::Transport
}

/// Whether a credentials provider failure sits anywhere in the source chain.
fn caused_by_credentials(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<CredentialsError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// `(part number, offset, length)` for each part of a file of `size` bytes.
pub(crate) fn part_ranges(size: u64, part_size: u64) -> Vec<(i32, u64, u64)> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    let mut part_number = 1;
    while offset < size {
        let length = part_size.min(size - offset);
        ranges.push((part_number, offset, length));
        offset += length;
        part_number += 1;
    }
    ranges
}

/// Uploads files into one bucket.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    client: s3::Client,
    bucket: String,
    multipart_threshold: u64,
    part_size: u64,
}

impl S3Uploader {
    /// Builds a client for the configured region. Credentials come from the
    /// default AWS provider chain. A custom endpoint switches to path-style
    /// addressing for S3-compatible services.
    pub async fn connect(storage: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()));
        if let Some(endpoint) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.endpoint_url.is_some())
            .build();

        Self::from_client(s3::Client::from_conf(s3_config), &storage.bucket)
    }

    pub fn from_client(client: s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: PART_SIZE,
        }
    }

    #[cfg(test)]
    fn with_part_size(mut self, multipart_threshold: u64, part_size: u64) -> Self {
        self.multipart_threshold = multipart_threshold;
        self.part_size = part_size;
        self
    }

    pub async fn upload_file(&self, s3_key: &str, file_path: &Path) -> Result<(), UploadError> {
        let missing = |source: std::io::Error| UploadError::LocalFileMissing {
            path: file_path.to_path_buf(),
            source,
        };
        let metadata = tokio::fs::metadata(file_path).await.map_err(missing)?;
        if !metadata.is_file() {
            return Err(missing(std::io::Error::other("not a regular file")));
        }
        let size = metadata.len();

        info!(
            "Uploading {} ({} bytes) to s3://{}/{}",
            file_path.display(),
            size,
            self.bucket,
            s3_key
        );

        if size <= self.multipart_threshold {
            self.put_single(s3_key, file_path).await?;
        } else {
            self.put_multipart(s3_key, file_path, size).await?;
        }

        info!(
            "✅ Successfully uploaded {} to s3://{}/{}",
            file_path.display(),
            self.bucket,
            s3_key
        );
        Ok(())
    }

    async fn put_single(&self, s3_key: &str, file_path: &Path) -> Result<(), UploadError> {
        let body = ByteStream::from_path(file_path)
            .await
            .map_err(|e| UploadError::LocalFileMissing {
                path: file_path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(s3_key)
            .body(body)
            .send()
            .await
            .map_err(|e| self.failure(s3_key, e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        s3_key: &str,
        file_path: &Path,
        size: u64,
    ) -> Result<(), UploadError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| self.failure(s3_key, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| UploadError::Transport {
                bucket: self.bucket.clone(),
                key: s3_key.to_string(),
                message: "service returned no multipart upload id".to_string(),
            })?
            .to_string();
        debug!("Started multipart upload {} for {}", upload_id, s3_key);

        let result = match self.upload_parts(s3_key, file_path, size, &upload_id).await {
            Ok(parts) => self
                .client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(s3_key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .map_err(|e| self.failure(s3_key, e)),
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.abort_multipart(s3_key, &upload_id).await;
        }
        result
    }

    async fn upload_parts(
        &self,
        s3_key: &str,
        file_path: &Path,
        size: u64,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let ranges = part_ranges(size, self.part_size);
        let total = ranges.len();
        let mut parts = Vec::with_capacity(total);

        for (part_number, offset, length) in ranges {
            let body = ByteStream::read_from()
                .path(file_path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|e| UploadError::LocalFileMissing {
                    path: file_path.to_path_buf(),
                    source: std::io::Error::other(e),
                })?;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(s3_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|e| self.failure(s3_key, e))?;

            debug!("Uploaded part {}/{} of {}", part_number, total, s3_key);
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_owned))
                    .build(),
            );
        }
        Ok(parts)
    }

    async fn abort_multipart(&self, s3_key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(s3_key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = aborted {
            warn!(
                "⚠️ Could not abort multipart upload {} for {}: {}",
                upload_id,
                s3_key,
                DisplayErrorContext(&e)
            );
        }
    }

    fn failure<E>(&self, s3_key: &str, err: SdkError<E, HttpResponse>) -> UploadError
    where
        E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    {
        let code = err
            .as_service_error()
            .and_then(|e| e.code())
            .map(str::to_owned);
        let status = err.raw_response().map(|response| response.status().as_u16());
        let credentials_missing = caused_by_credentials(&err);
        let message = DisplayErrorContext(&err).to_string();

        match classify_failure(code.as_deref(), status, credentials_missing) {
            FailureKind::Auth => UploadError::Auth {
                bucket: self.bucket.clone(),
                message,
            },
            FailureKind::Transport => UploadError::Transport {
                bucket: self.bucket.clone(),
                key: s3_key.to_string(),
                message,
            },
        }
    }
}
