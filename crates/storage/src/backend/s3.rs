//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, MinIO, Backblaze B2, Tigris (Fly.io), and
//! others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via configuration (file or
//! environment). The SDK's ambient credential chain is never consulted.

use crate::{
    Download, ObjectInfo, StorageBackend,
    backend::ObjectStream,
    error::{ErrorKind, Result},
    object::stage,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::DateTime,
    types::Object,
};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible storage backend.
///
/// Lists and downloads objects from a single bucket.
///
/// # Examples
///
/// ```no_run
/// use warden_storage::backend::S3Backend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "uploads",
///     "customer-uploads",
///     "us-east-1",
///     Some("http://localhost:9000"),
///     "access_key_id",
///     "secret_access_key",
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "warden-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (MinIO, Backblaze, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to UtcDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<UtcDateTime> {
        UtcDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    /// Build an object descriptor from a listing entry.
    ///
    /// Entries without a key are skipped (`None`); a missing ETag or size is
    /// treated as empty since some S3-compatible services omit them for
    /// zero-byte objects. An object without an ETag is rescanned every pass.
    fn object_info(bucket: &str, object: &Object) -> Result<Option<ObjectInfo>> {
        let Some(key) = object.key() else {
            return Ok(None);
        };
        let last_modified = match object.last_modified() {
            Some(dt) => Self::parse_datetime(dt)?,
            None => UtcDateTime::UNIX_EPOCH,
        };
        let size = object.size().unwrap_or_default().max(0) as u64;
        let etag = object.e_tag().unwrap_or_default();
        if etag.is_empty() {
            tracing::warn!(key, "Listed without an ETag; it will be scanned on every pass");
        }
        Ok(Some(ObjectInfo::new(bucket, key, etag, last_modified, size)))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectStream<'a> {
        Box::pin(stream! {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(prefix.map(str::to_string))
                .into_paginator()
                .send();
            loop {
                let permit = match self.acquire_permit().await {
                    Ok(permit) => permit,
                    Err(e) => { yield Err(e); break; },
                };
                let page = pages.next().await;
                drop(permit);
                let page = match page {
                    None => break,
                    Some(Ok(page)) => page,
                    Some(Err(e)) => {
                        yield Err(exn::Exn::from(ErrorKind::Network(DisplayErrorContext(&e).to_string())));
                        break;
                    },
                };
                for object in page.contents() {
                    match Self::object_info(&self.bucket, object) {
                        Ok(Some(info)) => yield Ok(info),
                        Ok(None) => {},
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    async fn download(&self, key: &str, staging: &Path) -> Result<Download> {
        let _permit = self.acquire_permit().await?;
        let response = self.client.get_object().bucket(&self.bucket).key(key).send().await.map_err(|e| {
            match e.as_service_error() {
                Some(service) if service.is_no_such_key() => ErrorKind::NotFound(key.to_string()),
                _ => ErrorKind::Network(DisplayErrorContext(&e).to_string()),
            }
        })?;
        // Dropping the TempPath on any early return below removes the
        // partially written file.
        let (mut file, path) = stage(staging)?;
        let mut body = response.body;
        let mut size = 0u64;
        while let Some(chunk) =
            body.try_next().await.map_err(|e| ErrorKind::Network(DisplayErrorContext(&e).to_string()))?
        {
            file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        tracing::debug!(bucket = %self.bucket, key, bytes = size, "Downloaded object to staging");
        Ok(Download::new(path, size))
    }
}
