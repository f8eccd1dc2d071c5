//! Object descriptors and downloaded local copies.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use tempfile::TempPath;
use time::UtcDateTime;

/// Object metadata returned by a listing pass.
///
/// One descriptor per remote object, immutable for the lifetime of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket (or backend name for non-S3 storage) the object lives in
    pub bucket: String,
    /// Full object key
    pub key: String,
    /// Opaque content identity (the S3 ETag, quotes and all)
    pub etag: String,
    /// Last modified timestamp reported by the backend
    pub last_modified: UtcDateTime,
    /// Object size in bytes
    pub size: u64,
}
impl ObjectInfo {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        etag: impl Into<String>,
        last_modified: UtcDateTime,
        size: u64,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            etag: etag.into(),
            last_modified,
            size,
        }
    }
}

/// A local copy of an object's bytes.
///
/// The file lives in the staging directory passed to
/// [`download()`](crate::StorageBackend::download) and is removed either
/// explicitly via [`remove()`](Self::remove) or when the value is dropped.
#[derive(Debug)]
pub struct Download {
    path: TempPath,
    size: u64,
}
impl Download {
    pub(crate) fn new(path: TempPath, size: u64) -> Self {
        Self { path, size }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written to the local copy.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the local copy, surfacing any I/O error (dropping a
    /// [`Download`] also deletes the file, but silently).
    pub fn remove(self) -> Result<()> {
        let path = self.path.to_path_buf();
        self.path.close().or_raise(|| ErrorKind::Staging(path))
    }
}

/// Create an empty temporary file inside `staging` for a download to be
/// written into.
pub(crate) fn stage(staging: &Path) -> Result<(tokio::fs::File, TempPath)> {
    let file = tempfile::Builder::new()
        .prefix("warden-")
        .tempfile_in(staging)
        .or_raise(|| ErrorKind::Staging(staging.to_path_buf()))?;
    let (file, path) = file.into_parts();
    Ok((tokio::fs::File::from_std(file), path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_and_remove() {
        let staging = tempfile::tempdir().unwrap();
        let (_file, path) = stage(staging.path()).unwrap();
        let download = Download::new(path, 0);
        let local = download.path().to_path_buf();
        assert!(local.starts_with(staging.path()));
        assert!(local.exists());
        download.remove().unwrap();
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_dropping_download_removes_file() {
        let staging = tempfile::tempdir().unwrap();
        let (_file, path) = stage(staging.path()).unwrap();
        let local = path.to_path_buf();
        drop(Download::new(path, 0));
        assert!(!local.exists());
    }

    #[test]
    fn test_stage_missing_directory() {
        let staging = tempfile::tempdir().unwrap();
        let missing = staging.path().join("does/not/exist");
        let err = stage(&missing).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Staging(_)));
    }
}
