//! The scanner chain.

use crate::error::{ErrorKind, Result};
use crate::scanner::{DigestScanner, IndicatorScanner, ReputationScanner, RuleScanner, Scanner};
use crate::{ScanContext, ScannerOptions};
use std::collections::HashSet;
use std::path::Path;
use warden_storage::ObjectInfo;

/// An ordered, fixed set of capabilities run over every object.
///
/// Order and enablement are decided at construction. A capability that
/// fails is logged and skipped over; it never stops the capabilities after
/// it.
pub struct Engine {
    scanners: Vec<Box<dyn Scanner>>,
}
impl Engine {
    /// Build a chain from capabilities in the order they should run.
    ///
    /// Fails if two capabilities share a name, since findings are keyed by
    /// name.
    pub fn new(scanners: Vec<Box<dyn Scanner>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for scanner in &scanners {
            if !seen.insert(scanner.name()) {
                exn::bail!(ErrorKind::DuplicateScanner(scanner.name().to_string()));
            }
        }
        let engine = Self { scanners };
        tracing::info!(
            enabled = ?engine.enabled().collect::<Vec<_>>(),
            disabled = ?engine.scanners.iter().filter(|s| !s.enabled()).map(|s| s.name()).collect::<Vec<_>>(),
            "Scanner chain ready"
        );
        Ok(engine)
    }

    /// The standard chain: digests, static indicators, reputation lookup,
    /// pattern rules. Digests always run first.
    pub async fn from_options(options: &ScannerOptions) -> Result<Self> {
        let digest = DigestScanner::new(options.digests.iter().copied())?;
        let indicators = IndicatorScanner::new(&options.indicators, digest.algorithms());
        let reputation = ReputationScanner::new(&options.reputation)?;
        let rules = RuleScanner::new(&options.rules).await;
        Self::new(vec![Box::new(digest), Box::new(indicators), Box::new(reputation), Box::new(rules)])
    }

    /// Names of the enabled capabilities, in chain order.
    pub fn enabled(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.scanners.iter().filter(|s| s.enabled()).map(|s| s.name())
    }

    /// Run every enabled capability over the local copy of an object.
    ///
    /// Always returns the context, holding whatever the capabilities that
    /// succeeded found.
    pub async fn process_file(&self, object: &ObjectInfo, local_path: &Path) -> ScanContext {
        let mut ctx = ScanContext::new(object, local_path);
        for scanner in self.scanners.iter().filter(|s| s.enabled()) {
            match scanner.scan(&mut ctx).await {
                Ok(finding) => ctx.findings.insert(scanner.name(), finding),
                Err(err) => {
                    tracing::warn!(
                        bucket = %ctx.bucket,
                        key = %ctx.key,
                        scanner = scanner.name(),
                        retryable = err.is_retryable(),
                        error = ?err,
                        "Scanner failed; continuing with the rest of the chain"
                    );
                },
            }
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DigestAlgorithm, Finding, IndicatorFinding};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::UtcDateTime;

    struct Fake {
        name: &'static str,
        enabled: bool,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }
    impl Fake {
        fn boxed(name: &'static str, enabled: bool, fail: bool) -> (Box<dyn Scanner>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Box::new(Self { name, enabled, fail, calls: Arc::clone(&calls) }), calls)
        }
    }
    #[async_trait]
    impl Scanner for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn scan(&self, _ctx: &mut ScanContext) -> Result<Finding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                exn::bail!(ErrorKind::Network("boom".to_string()));
            }
            Ok(Finding::Indicator(IndicatorFinding::default()))
        }
    }

    fn object() -> ObjectInfo {
        ObjectInfo::new("uploads", "a.bin", "\"e\"", UtcDateTime::now(), 0)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (a, _) = Fake::boxed("same", true, false);
        let (b, _) = Fake::boxed("same", false, false);
        let err = Engine::new(vec![a, b]).err().unwrap();
        assert!(matches!(&*err, ErrorKind::DuplicateScanner(name) if name == "same"));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_chain() {
        let (first, first_calls) = Fake::boxed("first", true, true);
        let (second, second_calls) = Fake::boxed("second", true, false);
        let engine = Engine::new(vec![first, second]).unwrap();
        let ctx = engine.process_file(&object(), Path::new("/tmp/a.bin")).await;
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert!(!ctx.findings.contains("first"));
        assert!(ctx.findings.contains("second"));
    }

    #[tokio::test]
    async fn test_disabled_never_invoked() {
        let (on, on_calls) = Fake::boxed("on", true, false);
        let (off, off_calls) = Fake::boxed("off", false, false);
        let engine = Engine::new(vec![off, on]).unwrap();
        assert_eq!(engine.enabled().collect::<Vec<_>>(), ["on"]);
        let ctx = engine.process_file(&object(), Path::new("/tmp/a.bin")).await;
        assert_eq!(off_calls.load(Ordering::SeqCst), 0);
        assert_eq!(on_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.findings.iter().map(|(name, _)| name).collect::<Vec<_>>(), ["on"]);
    }

    #[tokio::test]
    async fn test_standard_chain_on_empty_object() {
        let indicators = tempfile::tempdir().unwrap();
        std::fs::write(indicators.path().join("sha1.txt"), "da39a3ee5e6b4b0d3255bfef95601890afd80709\n").unwrap();
        let mut options = ScannerOptions::default();
        options.indicators.path = indicators.path().to_path_buf();
        options.rules.enabled = false;
        let engine = Engine::from_options(&options).await.unwrap();
        assert_eq!(engine.enabled().collect::<Vec<_>>(), [DigestScanner::NAME, IndicatorScanner::NAME]);

        let file = tempfile::NamedTempFile::new().unwrap();
        let ctx = engine.process_file(&object(), file.path()).await;
        assert_eq!(ctx.hashes.keys().copied().collect::<Vec<_>>(), DigestAlgorithm::DEFAULT);
        assert_eq!(
            ctx.findings.get(IndicatorScanner::NAME),
            Some(&Finding::Indicator(IndicatorFinding { matched: true, algorithms: vec![DigestAlgorithm::Sha1] }))
        );
        assert!(!ctx.findings.contains(ReputationScanner::NAME));
        assert!(!ctx.findings.contains(RuleScanner::NAME));
    }
}
