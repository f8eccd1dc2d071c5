use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use warden_report::ReporterOptions;
use warden_scanner::ScannerOptions;

/// Complete process configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub scan: ScanConfig,
    pub scanners: ScannerOptions,
    pub reporter: ReporterOptions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    S3,
    Local,
}

/// Where objects are listed and downloaded from.
///
/// `s3` reads `bucket`, `region`, `endpoint`, `key_id` and `key_secret`;
/// `local` reads `path` (and uses `bucket` as the bucket name reported for
/// its objects, defaulting to `local`).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub path: Option<PathBuf>,
    /// Only objects whose key starts with this string are scanned
    pub prefix: Option<String>,
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::S3,
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            key_id: None,
            key_secret: None,
            path: None,
            prefix: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
}
impl Default for LedgerConfig {
    fn default() -> Self {
        let path = match crate::project_dirs() {
            Some(dirs) => dirs.data_dir().join("ledger.db"),
            None => PathBuf::from("warden-ledger.db"),
        };
        Self { path }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub workers: usize,
    /// Directory downloads are staged in; the system temp dir if unset
    pub staging_dir: Option<PathBuf>,
    /// Leave the ledger untouched when delivery fails, so the object is
    /// retried on the next pass
    pub require_delivery: bool,
}
impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            staging_dir: None,
            require_delivery: false,
        }
    }
}
impl ScanConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Config {
    /// Check the combinations serde can't express.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        match self.storage.kind {
            StorageKind::S3 => {
                if self.storage.bucket.trim().is_empty() {
                    problems.push("storage.bucket is required for s3 storage");
                }
                if !present(&self.storage.key_id) || !present(&self.storage.key_secret) {
                    problems.push("storage.key_id and storage.key_secret are required for s3 storage");
                }
            },
            StorageKind::Local => {
                if self.storage.path.is_none() {
                    problems.push("storage.path is required for local storage");
                }
            },
        }
        if self.scan.workers == 0 {
            problems.push("scan.workers must be at least 1");
        }
        if self.scanners.digests.is_empty() {
            problems.push("scanners.digests must name at least one algorithm");
        }
        if self.scanners.reputation.timeout_secs == 0 || self.scanners.rules.timeout_secs == 0 {
            problems.push("scanner timeouts must be at least 1 second");
        }
        if self.reporter.timeout_secs == 0 {
            problems.push("reporter.timeout_secs must be at least 1 second");
        }
        match problems.is_empty() {
            true => Ok(()),
            false => exn::bail!(ErrorKind::Invalid(problems.join("; "))),
        }
    }
}
