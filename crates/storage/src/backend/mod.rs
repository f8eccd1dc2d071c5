//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the listing and fetch
//! collaborator of the scan pipeline, implemented for S3-compatible services,
//! a local directory tree, and (for tests) an in-memory bucket.

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::object::{Download, ObjectInfo};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type ObjectStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectInfo>> + Send + 'a>>;

/// Unified interface for object storage backends.
///
/// # Examples
///
/// ```
/// use warden_storage::{backend::StorageBackend, error::Result};
///
/// async fn largest_object(backend: &dyn StorageBackend) -> Result<Option<u64>> {
///     let objects = backend.list(Some("uploads/")).await?;
///     Ok(objects.iter().map(|object| object.size).max())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Bucket every listed object belongs to; the first half of the ledger
    /// key.
    fn bucket(&self) -> &str;

    /// List all objects matching an optional key prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning. A listing error anywhere in the stream fails the whole
    /// listing.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream object metadata matching an optional key prefix.
    ///
    /// Prefixes are plain string prefixes of the object key (S3 semantics):
    /// `"up"` matches both `"uploads/a.bin"` and `"update.exe"`. Pagination
    /// is handled internally.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use warden_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(object) = stream.try_next().await? {
    ///     println!("{}: {} bytes ({})", object.key, object.size, object.etag);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectStream<'a>;

    /// Download an object's bytes into a new temporary file inside `staging`.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// no longer exists. The caller owns the returned [`Download`] and is
    /// responsible for removing it; a partially written file is removed
    /// before an error is returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use warden_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let download = backend.download("uploads/invoice.pdf", &std::env::temp_dir()).await?;
    /// println!("{} bytes at {}", download.size(), download.path().display());
    /// download.remove()?;
    /// # Ok(())
    /// # }
    /// ```
    async fn download(&self, key: &str, staging: &Path) -> Result<Download>;
}
