use crate::Summary;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use warden_ledger::Ledger;
use warden_report::ReporterHandle;
use warden_scanner::Engine;
use warden_storage::{BackendHandle, ObjectInfo};

type Queue = Arc<Mutex<VecDeque<ObjectInfo>>>;

#[derive(Clone, Debug)]
pub struct PoolOptions {
    /// Number of concurrent workers; zero is treated as one
    pub workers: usize,
    /// Directory downloads are staged in
    pub staging_dir: PathBuf,
    /// Leave the ledger untouched when delivery fails
    pub require_delivery: bool,
}

/// A fixed-size pool of workers draining one pre-filled queue of objects.
///
/// Each worker takes the next object, runs it through the whole pipeline,
/// and goes back for more until the queue is empty or the pass is
/// cancelled. Nothing is shared between jobs except the collaborators
/// themselves.
#[derive(Clone)]
pub struct Pool {
    pub(crate) backend: BackendHandle,
    pub(crate) ledger: Ledger,
    pub(crate) engine: Arc<Engine>,
    pub(crate) reporter: ReporterHandle,
    pub(crate) options: PoolOptions,
}

impl Pool {
    pub fn new(
        backend: BackendHandle,
        ledger: Ledger,
        engine: Arc<Engine>,
        reporter: ReporterHandle,
        options: PoolOptions,
    ) -> Self {
        Self { backend, ledger, engine, reporter, options }
    }

    /// Process one listing pass to completion (or cancellation).
    ///
    /// Duplicate keys are collapsed before anything is queued. Cancellation
    /// is only observed between jobs: a worker finishes the object it is on,
    /// then stops, and whatever is left in the queue is counted as
    /// unprocessed.
    pub async fn run(&self, objects: Vec<ObjectInfo>, cancel: CancellationToken) -> Summary {
        let listed = objects.len();
        let jobs = dedupe(objects);
        let mut summary = Summary {
            listed,
            duplicates: listed - jobs.len(),
            ..Default::default()
        };
        let workers = self.options.workers.max(1);
        tracing::info!(backend = self.backend.name(), jobs = jobs.len(), workers, "Starting scan pass");
        let queue: Queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let mut set = JoinSet::new();
        for id in 0..workers {
            let pool = self.clone();
            let queue = queue.clone();
            let cancel = cancel.clone();
            set.spawn(
                async move { pool.work(&queue, &cancel).await }
                    .instrument(tracing::info_span!("worker", id)),
            );
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(tally) => summary.merge(tally),
                Err(err) => tracing::error!(error = %err, "Worker stopped abnormally"),
            }
        }
        summary.unprocessed = queue.lock().await.len();
        summary
    }

    async fn work(&self, queue: &Mutex<VecDeque<ObjectInfo>>, cancel: &CancellationToken) -> Summary {
        let mut tally = Summary::default();
        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Pass cancelled; worker stopping");
                break;
            }
            let next = queue.lock().await.pop_front();
            let Some(object) = next else {
                break;
            };
            let outcome = self.process(&object).await;
            tally.record(&outcome);
        }
        tally
    }
}

/// Collapse listing entries that share a key.
///
/// The entry with the latest modification time wins (the later entry on a
/// tie). First-seen order is otherwise preserved.
pub(crate) fn dedupe(objects: Vec<ObjectInfo>) -> Vec<ObjectInfo> {
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(objects.len());
    let mut jobs: Vec<ObjectInfo> = Vec::with_capacity(objects.len());
    for object in objects {
        match seen.get(&object.key) {
            Some(&index) => {
                tracing::warn!(key = %object.key, "Key listed more than once; keeping the newest entry");
                if object.last_modified >= jobs[index].last_modified {
                    jobs[index] = object;
                }
            },
            None => {
                seen.insert(object.key.clone(), jobs.len());
                jobs.push(object);
            },
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Outcome, Recorded};
    use async_trait::async_trait;
    use rstest::rstest;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;
    use time::{Duration, UtcDateTime};
    use warden_ledger::{Database, Upsert};
    use warden_report::Reporter;
    use warden_report::error::{ErrorKind as ReportErrorKind, Result as ReportResult};
    use warden_scanner::scanner::DigestScanner;
    use warden_scanner::{DigestAlgorithm, ScanContext};
    use warden_storage::StorageBackend;
    use warden_storage::backend::MockBackend;

    #[derive(Default)]
    struct Recorder {
        delivered: StdMutex<Vec<ScanContext>>,
        failing: bool,
        /// Cancelled on the first report, while that job is still in flight
        cancels: Option<CancellationToken>,
    }
    impl Recorder {
        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<_> = self.delivered.lock().unwrap().iter().map(|ctx| ctx.key.clone()).collect();
            keys.sort();
            keys
        }
    }

    #[async_trait]
    impl Reporter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn report(&self, ctx: &ScanContext) -> ReportResult<()> {
            if let Some(cancel) = &self.cancels {
                cancel.cancel();
            }
            if self.failing {
                exn::bail!(ReportErrorKind::Network("connection refused".to_string()));
            }
            self.delivered.lock().unwrap().push(ctx.clone());
            Ok(())
        }
    }

    struct Harness {
        backend: Arc<MockBackend>,
        ledger: Ledger,
        reporter: Arc<Recorder>,
        staging: TempDir,
        pool: Pool,
    }
    impl Harness {
        async fn new(backend: MockBackend, reporter: Recorder, require_delivery: bool) -> Self {
            let db = Database::connect_in_memory().await.unwrap();
            let ledger = Ledger::from(&db);
            let backend = Arc::new(backend);
            let reporter = Arc::new(reporter);
            let staging = tempfile::tempdir().unwrap();
            let engine = Engine::new(vec![Box::new(DigestScanner::new([DigestAlgorithm::Sha256]).unwrap())]).unwrap();
            let options = PoolOptions {
                workers: 3,
                staging_dir: staging.path().to_path_buf(),
                require_delivery,
            };
            let pool = Pool::new(backend.clone(), ledger.clone(), Arc::new(engine), reporter.clone(), options);
            Self { backend, ledger, reporter, staging, pool }
        }

        async fn pass(&self) -> Summary {
            let objects = self.backend.list(None).await.unwrap();
            self.pool.run(objects, CancellationToken::new()).await
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.staging.path()).unwrap().count()
        }
    }

    fn bucket() -> MockBackend {
        MockBackend::with_objects([
            ("uploads/invoice.pdf", Vec::from(*b"%PDF-1.7")),
            ("uploads/setup.exe", Vec::from(*b"MZ\x90\x00")),
            ("avatars/cat.png", Vec::from(*b"\x89PNG")),
        ])
    }

    #[tokio::test]
    async fn test_first_pass_scans_everything() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        let summary = harness.pass().await;
        assert_eq!(summary.listed, 3);
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(harness.reporter.keys(), ["avatars/cat.png", "uploads/invoice.pdf", "uploads/setup.exe"]);
        assert_eq!(harness.ledger.count().await.unwrap(), 3);
        assert_eq!(harness.staged_files(), 0);

        let delivered = harness.reporter.delivered.lock().unwrap();
        assert!(delivered.iter().all(|ctx| ctx.hashes.contains_key(&DigestAlgorithm::Sha256)));
    }

    #[tokio::test]
    async fn test_unchanged_objects_are_skipped() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        harness.pass().await;
        let downloads = harness.backend.downloads();

        let summary = harness.pass().await;
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.scanned, 0);
        assert_eq!(harness.backend.downloads(), downloads);
        assert_eq!(harness.reporter.keys().len(), 3);
    }

    #[tokio::test]
    async fn test_changed_identity_is_rescanned() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        harness.pass().await;
        let before = harness.ledger.lookup("mock", "uploads/setup.exe").await.unwrap().unwrap();

        harness.backend.put("uploads/setup.exe", *b"MZ\x90\x00 patched").await;
        let summary = harness.pass().await;
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.skipped, 2);
        let after = harness.ledger.lookup("mock", "uploads/setup.exe").await.unwrap().unwrap();
        assert_ne!(before.etag, after.etag);
        assert_eq!(harness.ledger.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_modified_after_last_scan_is_rescanned() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        harness.pass().await;

        // Same bytes (so the same identity), but touched after the scan.
        let later = UtcDateTime::now() + Duration::hours(1);
        harness.backend.put_at("uploads/invoice.pdf", *b"%PDF-1.7", later).await;
        let summary = harness.pass().await;
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.skipped, 2);
    }

    #[tokio::test]
    async fn test_download_failure_leaves_ledger_untouched() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        harness.backend.fail_downloads_for("uploads/setup.exe").await;

        let summary = harness.pass().await;
        assert_eq!(summary.download_failures, 1);
        assert_eq!(summary.scanned, 2);
        assert!(harness.ledger.lookup("mock", "uploads/setup.exe").await.unwrap().is_none());
        assert!(!harness.reporter.keys().contains(&"uploads/setup.exe".to_string()));

        harness.backend.heal("uploads/setup.exe").await;
        let summary = harness.pass().await;
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.skipped, 2);
    }

    #[rstest]
    #[case::ledger_still_updated(false, 1)]
    #[case::delivery_required(true, 0)]
    #[tokio::test]
    async fn test_delivery_failure(#[case] require_delivery: bool, #[case] recorded: u64) {
        let backend = MockBackend::with_objects([("uploads/setup.exe", Vec::from(*b"MZ"))]);
        let reporter = Recorder { failing: true, ..Default::default() };
        let harness = Harness::new(backend, reporter, require_delivery).await;

        let summary = harness.pass().await;
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.delivery_failures, 1);
        assert_eq!(summary.withheld, 1 - recorded as usize);
        assert_eq!(harness.ledger.count().await.unwrap(), recorded);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pass_processes_nothing() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let objects = harness.backend.list(None).await.unwrap();
        let summary = harness.pool.run(objects, cancel).await;
        assert_eq!(summary.unprocessed, 3);
        assert_eq!(summary.attempted(), 0);
        assert_eq!(harness.backend.downloads(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_lets_current_object_finish() {
        let cancel = CancellationToken::new();
        let reporter = Recorder { cancels: Some(cancel.clone()), ..Default::default() };
        let mut harness = Harness::new(bucket(), reporter, false).await;
        harness.pool.options.workers = 1;

        let objects = harness.backend.list(None).await.unwrap();
        let summary = harness.pool.run(objects, cancel).await;
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.unprocessed, 2);
        assert_eq!(harness.reporter.keys().len(), 1);
        assert_eq!(harness.backend.downloads(), 1);
        assert_eq!(harness.ledger.count().await.unwrap(), 1);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_object_removed_after_listing() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        let objects = harness.backend.list(None).await.unwrap();
        assert!(harness.backend.remove("uploads/invoice.pdf").await);

        let summary = harness.pool.run(objects, CancellationToken::new()).await;
        assert_eq!(summary.download_failures, 1);
        assert_eq!(summary.scanned, 2);
        assert!(harness.ledger.lookup("mock", "uploads/invoice.pdf").await.unwrap().is_none());
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_listing_entries_scan_once() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        let mut objects = harness.backend.list(None).await.unwrap();
        objects.extend(objects.clone());

        let summary = harness.pool.run(objects, CancellationToken::new()).await;
        assert_eq!(summary.listed, 6);
        assert_eq!(summary.duplicates, 3);
        assert_eq!(summary.scanned, 3);
        assert_eq!(harness.ledger.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_process_outcomes() {
        let harness = Harness::new(bucket(), Recorder::default(), false).await;
        let object = harness.backend.list(Some("avatars/")).await.unwrap().remove(0);
        assert_eq!(
            harness.pool.process(&object).await,
            Outcome::Scanned { delivered: true, recorded: Recorded::Ledger(Upsert::Inserted) }
        );
        assert_eq!(harness.pool.process(&object).await, Outcome::Skipped);
    }

    fn listed(key: &str, etag: &str, modified: i64) -> ObjectInfo {
        let modified = UtcDateTime::from_unix_timestamp(modified).unwrap();
        ObjectInfo::new("uploads", key, etag, modified, 1)
    }

    #[test]
    fn test_dedupe_keeps_newest() {
        let jobs = dedupe(vec![
            listed("a", "\"1\"", 100),
            listed("b", "\"2\"", 100),
            listed("a", "\"3\"", 200),
            listed("a", "\"4\"", 150),
            listed("b", "\"5\"", 100),
        ]);
        let jobs: Vec<_> = jobs.iter().map(|o| (o.key.as_str(), o.etag.as_str())).collect();
        assert_eq!(jobs, [("a", "\"3\""), ("b", "\"5\"")]);
    }
}
