//! In-memory storage backend for testing.

use super::ObjectStream;
use crate::error::{ErrorKind, Result};
use crate::object::stage;
use crate::{Download, ObjectInfo, StorageBackend};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct MockObject {
    data: Vec<u8>,
    modified: UtcDateTime,
    etag: String,
}
impl MockObject {
    fn new(data: Vec<u8>, modified: UtcDateTime) -> Self {
        let etag = format!("\"{}\"", blake3::hash(&data).to_hex());
        Self { data, modified, etag }
    }
}

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so the bucket can
/// be changed between scan passes while a pool holds the backend. ETags are
/// derived from the content, so rewriting an object with different bytes
/// changes its identity, exactly like S3.
///
/// # Examples
///
/// ```
/// use warden_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_objects([
///     ("uploads/invoice.pdf", b"%PDF-1.7"),
/// ]);
/// assert_eq!(backend.list(None).await?.len(), 1);
///
/// backend.put("uploads/setup.exe", b"MZ...").await;
/// assert_eq!(backend.list(Some("uploads/")).await?.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    bucket: String,
    storage: RwLock<HashMap<String, MockObject>>,
    failing: RwLock<HashSet<String>>,
    downloads: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// # Example
    ///
    /// ```
    /// use warden_storage::backend::MockBackend;
    ///
    /// let backend = MockBackend::with_objects([
    ///     ("one.bin", b"object 1"),
    ///     ("dir/two.bin", b"object 2"),
    /// ]);
    /// ```
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let map = objects.into_iter().map(|(key, data)| (key.into(), MockObject::new(data.into(), now))).collect();
        Self {
            name: "mock".to_string(),
            bucket: "mock".to_string(),
            storage: RwLock::new(map),
            failing: RwLock::new(HashSet::new()),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Change the bucket reported on every listed object.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Insert or overwrite an object, stamping it with the current time.
    pub async fn put(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.put_at(key, data, UtcDateTime::now()).await;
    }

    /// Insert or overwrite an object with an explicit modification time.
    pub async fn put_at(&self, key: impl Into<String>, data: impl Into<Vec<u8>>, modified: UtcDateTime) {
        self.storage.write().await.insert(key.into(), MockObject::new(data.into(), modified));
    }

    /// Remove an object from the bucket.
    pub async fn remove(&self, key: &str) -> bool {
        self.storage.write().await.remove(key).is_some()
    }

    /// Make every download of `key` fail with a network error until
    /// [`heal()`](Self::heal) is called.
    pub async fn fail_downloads_for(&self, key: impl Into<String>) {
        self.failing.write().await.insert(key.into());
    }

    pub async fn heal(&self, key: &str) {
        self.failing.write().await.remove(key);
    }

    /// Number of download attempts made so far (successful or not).
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(&str, &[u8]); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectStream<'a> {
        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<ObjectInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(key, _)| prefix.is_none_or(|pfx| key.starts_with(pfx)))
                    .map(|(key, object)| {
                        ObjectInfo::new(&self.bucket, key, &object.etag, object.modified, object.data.len() as u64)
                    })
                    .collect()
            };
            for object in entries {
                yield Ok(object);
            }
        })
    }

    async fn download(&self, key: &str, staging: &Path) -> Result<Download> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().await.contains(key) {
            exn::bail!(ErrorKind::Network(format!("injected failure downloading {key}")));
        }
        let data = match self.storage.read().await.get(key) {
            Some(object) => object.data.clone(),
            None => exn::bail!(ErrorKind::NotFound(key.to_string())),
        };
        let (mut file, path) = stage(staging)?;
        file.write_all(&data).await.map_err(ErrorKind::Io)?;
        file.flush().await.map_err(ErrorKind::Io)?;
        Ok(Download::new(path, data.len() as u64))
    }
}
