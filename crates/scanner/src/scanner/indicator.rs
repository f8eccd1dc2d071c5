use super::Scanner;
use crate::error::{ErrorKind, Result};
use crate::{DigestAlgorithm, Finding, IndicatorFinding, IndicatorOptions, ScanContext};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

type IndicatorSets = BTreeMap<DigestAlgorithm, HashSet<String>>;

/// Membership test of an object's digests against static lists of known-bad
/// digests, one list per algorithm.
///
/// Lists are loaded once, at construction, from `<dir>/<algorithm>.txt`:
/// one digest per line, blank lines and `#` comments ignored. A missing or
/// unreadable list leaves that algorithm's set empty; construction never
/// fails.
#[derive(Clone, Debug)]
pub struct IndicatorScanner {
    enabled: bool,
    sets: Arc<IndicatorSets>,
}
impl IndicatorScanner {
    pub const NAME: &'static str = "indicators";

    pub fn new(options: &IndicatorOptions, algorithms: impl IntoIterator<Item = DigestAlgorithm>) -> Self {
        if !options.enabled {
            tracing::info!(scanner = Self::NAME, "Disabled by configuration");
            return Self { enabled: false, sets: Arc::default() };
        }
        let sets = algorithms.into_iter().map(|algorithm| (algorithm, load(&options.path, algorithm))).collect();
        Self::from_sets(sets)
    }

    /// Build a scanner directly from in-memory indicator sets.
    pub fn from_sets(sets: IndicatorSets) -> Self {
        let total: usize = sets.values().map(HashSet::len).sum();
        tracing::info!(scanner = Self::NAME, indicators = total, "Loaded static indicators");
        Self { enabled: true, sets: Arc::new(sets) }
    }

    /// Number of loaded indicators for an algorithm.
    pub fn len(&self, algorithm: DigestAlgorithm) -> usize {
        self.sets.get(&algorithm).map_or(0, HashSet::len)
    }
}

fn load(dir: &Path, algorithm: DigestAlgorithm) -> HashSet<String> {
    let path = dir.join(format!("{algorithm}.txt"));
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Indicator list unavailable; set left empty");
            return HashSet::new();
        },
    };
    parse(&contents, algorithm, &path)
}

fn parse(contents: &str, algorithm: DigestAlgorithm, source: &Path) -> HashSet<String> {
    let mut set = HashSet::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let digest = line.to_lowercase();
        if !algorithm.is_valid_hex(&digest) {
            tracing::warn!(path = %source.display(), line = number + 1, %algorithm, "Skipping malformed indicator");
            continue;
        }
        set.insert(digest);
    }
    set
}

#[async_trait]
impl Scanner for IndicatorScanner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn scan(&self, ctx: &mut ScanContext) -> Result<Finding> {
        if ctx.hashes.is_empty() {
            exn::bail!(ErrorKind::MissingDigests(ctx.key.clone()));
        }
        let sets = Arc::clone(&self.sets);
        let hashes = ctx.hashes.clone();
        let algorithms = tokio::task::spawn_blocking(move || {
            hashes
                .iter()
                .filter(|(algorithm, digest)| sets.get(*algorithm).is_some_and(|set| set.contains(*digest)))
                .map(|(algorithm, _)| *algorithm)
                .collect::<Vec<_>>()
        })
        .await
        .or_raise(|| ErrorKind::Task)?;
        if !algorithms.is_empty() {
            tracing::warn!(bucket = %ctx.bucket, key = %ctx.key, ?algorithms, "Known-bad indicator matched");
        }
        Ok(Finding::Indicator(IndicatorFinding { matched: !algorithms.is_empty(), algorithms }))
    }
}
