use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_JOB: &str = "warden";

/// Sink selection and settings.
///
/// Only the fields relevant to `kind` are read:
///
/// | kind            | fields                 |
/// |-----------------|------------------------|
/// | `json`          | `path` (stdout if unset) |
/// | `elasticsearch` | `url`, `index`         |
/// | `loki`          | `url`, `job`           |
/// | `prometheus`    | `url`, `job`           |
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ReporterOptions {
    pub kind: String,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub index: Option<String>,
    pub job: String,
    pub timeout_secs: u64,
}
impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            kind: "json".to_string(),
            path: None,
            url: None,
            index: None,
            job: DEFAULT_JOB.to_string(),
            timeout_secs: 10,
        }
    }
}
