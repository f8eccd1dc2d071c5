use crate::Pool;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;
use warden_ledger::Upsert;
use warden_scanner::ScanContext;
use warden_storage::{Download, ObjectInfo};

/// What happened to the ledger once an object had been scanned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recorded {
    /// The ledger now holds the identity and scan time of this pass.
    Ledger(Upsert),
    /// Delivery failed and the pool requires delivery, so the ledger was
    /// left alone and the object will be scanned again next pass.
    Withheld,
    /// The ledger write failed; the object will be scanned again next pass.
    Failed,
}

/// Indicates how far a single object made it through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The ledger already covers this identity and modification time; no
    /// download, scan or report happened.
    Skipped,
    /// The object could not be fetched. Nothing was scanned or reported and
    /// the ledger is untouched.
    DownloadFailed,
    /// The scanner chain ran over the object.
    Scanned { delivered: bool, recorded: Recorded },
}

impl Pool {
    /// Run one object through the pipeline: skip check, download, scanner
    /// chain, report, ledger update, cleanup.
    ///
    /// Never fails. Errors are logged against the object and reflected in
    /// the returned [`Outcome`]; the staged download is removed on every
    /// path that created one.
    pub(crate) async fn process(&self, object: &ObjectInfo) -> Outcome {
        match self.covered(object).await {
            Ok(true) => {
                tracing::debug!(key = %object.key, etag = %object.etag, "Unchanged since last scan; skipping");
                return Outcome::Skipped;
            },
            Ok(false) => {},
            Err(err) => {
                tracing::warn!(key = %object.key, error = ?err, "Ledger lookup failed; scanning anyway");
            },
        }
        let download = match self.download(object).await {
            Ok(download) => download,
            Err(err) => {
                tracing::warn!(key = %object.key, error = ?err, "Download failed; skipping object");
                return Outcome::DownloadFailed;
            },
        };
        let ctx = self.engine.process_file(object, download.path()).await;
        let delivered = match self.deliver(&ctx).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %object.key, reporter = self.reporter.name(), error = ?err, "Delivery failed");
                false
            },
        };
        let recorded = match (delivered, self.options.require_delivery) {
            (false, true) => {
                tracing::info!(key = %object.key, "Ledger left untouched so the object is retried next pass");
                Recorded::Withheld
            },
            _ => match self.record(object).await {
                Ok(upsert) => Recorded::Ledger(upsert),
                Err(err) => {
                    tracing::warn!(key = %object.key, error = ?err, "Ledger update failed");
                    Recorded::Failed
                },
            },
        };
        if let Err(err) = download.remove().or_raise(|| ErrorKind::Cleanup) {
            tracing::warn!(key = %object.key, error = ?err, "Staged download left behind");
        }
        tracing::info!(
            key = %object.key,
            size = object.size,
            matched = ctx.findings.any_matched(),
            delivered,
            "Scanned object"
        );
        Outcome::Scanned { delivered, recorded }
    }

    async fn covered(&self, object: &ObjectInfo) -> Result<bool> {
        let record = self.ledger.lookup(&object.bucket, &object.key).await.or_raise(|| ErrorKind::Lookup)?;
        Ok(record.is_some_and(|record| record.covers(&object.etag, object.last_modified)))
    }

    async fn download(&self, object: &ObjectInfo) -> Result<Download> {
        self.backend.download(&object.key, &self.options.staging_dir).await.or_raise(|| ErrorKind::Download)
    }

    async fn deliver(&self, ctx: &ScanContext) -> Result<()> {
        self.reporter.report(ctx).await.or_raise(|| ErrorKind::Delivery)
    }

    async fn record(&self, object: &ObjectInfo) -> Result<Upsert> {
        self.ledger
            .upsert(&object.bucket, &object.key, &object.etag, UtcDateTime::now())
            .await
            .or_raise(|| ErrorKind::Record)
    }
}
