//! Local filesystem storage backend.
//!
//! Treats a directory tree as a bucket: every regular file below the root is
//! an object whose key is its `/`-separated path relative to the root. Files
//! are accessed via `tokio::fs` for async I/O.

use crate::backend::ObjectStream;
use crate::error::ErrorKind;
use crate::object::stage;
use crate::{Download, ObjectInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncWriteExt;

enum WalkEntry {
    Object(ObjectInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Content identity
///
/// Files have no ETag, so a weak one is derived from the modification time
/// and size (`W/"<mtime-nanos-hex>-<size-hex>"`, the same shape web servers
/// use). Touching or rewriting a file changes its identity.
///
/// # Examples
///
/// ```no_run
/// use warden_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("quarantine", "/srv/quarantine")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Root directory standing in for the bucket
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// The backend's `name` doubles as its bucket name.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory. Unlike a writable library, a missing root is not created:
    /// there would be nothing to scan.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    /// Get the absolute path for an object key.
    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        let validated = validate_path(key)?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to an object key.
    fn key_for(&self, absolute: &Path) -> Result<String> {
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        let relative = validate_path(relative)?;
        let parts = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_raise(|| ErrorKind::InvalidPath(relative.clone()))?;
        Ok(parts.join("/"))
    }

    fn weak_etag(modified: UtcDateTime, size: u64) -> String {
        format!("W/\"{:x}-{:x}\"", modified.unix_timestamp_nanos(), size)
    }

    fn object_info(&self, key: String, metadata: &Metadata) -> Result<ObjectInfo> {
        let modified: UtcDateTime = metadata.modified().map_err(ErrorKind::Io)?.into();
        let size = metadata.len();
        Ok(ObjectInfo::new(&self.name, key, Self::weak_etag(modified, size), modified, size))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Keeps the `?` operator usable for everything that happens to a single
    /// directory entry inside the listing stream.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&str>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !metadata.is_file() {
            // Note: silently drop what is most likely a broken symlink.
            return Ok(WalkEntry::Skip);
        }
        let key = self.key_for(&path)?;
        if let Some(pfx) = prefix
            && !key.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        Ok(WalkEntry::Object(self.object_info(key, &metadata)?))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectStream<'a> {
        let mut stack = vec![self.root.clone()];
        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, prefix).await {
                        Ok(WalkEntry::Object(o)) => yield Ok(o),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn download(&self, key: &str, staging: &Path) -> Result<Download> {
        let source_path = self.absolute_path(key)?;
        let mut source = fs::File::open(&source_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
            _ => Self::map_io_error(e, &source_path),
        })?;
        let (mut target, path) = stage(staging)?;
        let size = tokio::io::copy(&mut source, &mut target).await.map_err(ErrorKind::Io)?;
        target.flush().await.map_err(ErrorKind::Io)?;
        tracing::debug!(key, bytes = size, local = %path.display(), "Copied object to staging");
        Ok(Download::new(path, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn backend_with(files: &[(&str, &[u8])]) -> (tempfile::TempDir, LocalBackend) {
        let root = tempfile::tempdir().unwrap();
        for (key, data) in files {
            let path = root.path().join(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, data).unwrap();
        }
        let backend = LocalBackend::new("quarantine", root.path()).unwrap();
        (root, backend)
    }

    #[test]
    fn test_new_requires_absolute_existing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_absolute_path_rejects_traversal() {
        let (root, backend) = backend_with(&[]);
        assert_eq!(backend.absolute_path("a/b.bin").unwrap(), root.path().join("a/b.bin"));
        assert!(backend.absolute_path("../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_list_returns_all_objects() {
        let (_root, backend) = backend_with(&[("a.exe", b"1"), ("dir/b.dll", b"22"), ("dir/sub/c.js", b"333")]);
        let mut objects = backend.list(None).await.unwrap();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a.exe", "dir/b.dll", "dir/sub/c.js"]);
        assert!(objects.iter().all(|o| o.bucket == "quarantine"));
        assert_eq!(objects[2].size, 3);
    }

    #[tokio::test]
    async fn test_list_prefix_is_a_string_prefix() {
        let (_root, backend) =
            backend_with(&[("uploads/a.bin", b"a"), ("update.exe", b"b"), ("other/c.bin", b"c")]);
        let mut keys: Vec<_> = backend.list(Some("up")).await.unwrap().into_iter().map(|o| o.key).collect();
        keys.sort();
        assert_eq!(keys, ["update.exe", "uploads/a.bin"]);
    }

    #[tokio::test]
    async fn test_etag_changes_with_content() {
        let (root, backend) = backend_with(&[("a.bin", b"first")]);
        let before = backend.list(None).await.unwrap().remove(0);
        std::fs::write(root.path().join("a.bin"), b"second version").unwrap();
        let after = backend.list(None).await.unwrap().remove(0);
        assert_ne!(before.etag, after.etag);
        assert!(after.etag.starts_with("W/\""));
    }

    #[tokio::test]
    async fn test_download_copies_bytes() {
        let (_root, backend) = backend_with(&[("dir/payload.bin", b"MZ\x90\x00")]);
        let staging = tempfile::tempdir().unwrap();
        let download = backend.download("dir/payload.bin", staging.path()).await.unwrap();
        assert_eq!(download.size(), 4);
        assert_eq!(std::fs::read(download.path()).unwrap(), b"MZ\x90\x00");
        download.remove().unwrap();
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_missing_object() {
        let (_root, backend) = backend_with(&[]);
        let staging = tempfile::tempdir().unwrap();
        let err = backend.download("gone.bin", staging.path()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(key) if key == "gone.bin"));
        // Nothing staged when the source could not be opened.
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_rejects_traversal() {
        let (_root, backend) = backend_with(&[]);
        let staging = tempfile::tempdir().unwrap();
        assert!(backend.download("../../etc/passwd", staging.path()).await.is_err());
    }
}
