//! Delivery of scan results.
//!
//! Every scanned object becomes one [`ScanReport`] document
//! (`{bucket, key, size, hashes, scan_time, results}`) handed to a
//! [`Reporter`]. Delivery is best-effort: a failed report is the caller's to
//! log; nothing here retries.

mod document;
pub mod error;
mod options;
mod sink;

pub use crate::document::ScanReport;
pub use crate::options::{DEFAULT_JOB, ReporterOptions};
pub use crate::sink::{ElasticsearchReporter, JsonReporter, LokiReporter, PrometheusReporter};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::sync::Arc;
use warden_scanner::ScanContext;

/// A sink for scan results.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Sink kind, for logging.
    fn name(&self) -> &'static str;

    async fn report(&self, ctx: &ScanContext) -> Result<()>;
}

pub type ReporterHandle = Arc<dyn Reporter>;

/// Build the configured sink.
///
/// Fails when the kind is unknown or a field the kind requires is missing;
/// callers treat this as a startup failure.
pub fn build(options: &ReporterOptions) -> Result<ReporterHandle> {
    let reporter: ReporterHandle = match options.kind.trim().to_lowercase().as_str() {
        "" | "json" => match &options.path {
            Some(path) => Arc::new(JsonReporter::file(path)?),
            None => Arc::new(JsonReporter::stdout()),
        },
        "elasticsearch" => Arc::new(ElasticsearchReporter::new(options)?),
        "loki" => Arc::new(LokiReporter::new(options)?),
        "prometheus" => Arc::new(PrometheusReporter::new(options)?),
        other => exn::bail!(ErrorKind::Config(format!("unknown reporter kind `{other}`"))),
    };
    tracing::info!(reporter = reporter.name(), "Reporter ready");
    Ok(reporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn options(kind: &str, url: Option<&str>, index: Option<&str>) -> ReporterOptions {
        ReporterOptions {
            kind: kind.to_string(),
            url: url.map(str::to_string),
            index: index.map(str::to_string),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(options("", None, None), "json")]
    #[case(options("JSON", None, None), "json")]
    #[case(options("elasticsearch", Some("http://es:9200"), Some("scans")), "elasticsearch")]
    #[case(options("loki", Some("http://loki:3100"), None), "loki")]
    #[case(options("prometheus", Some("http://gateway:9091"), None), "prometheus")]
    fn test_build(#[case] options: ReporterOptions, #[case] expected: &str) {
        assert_eq!(build(&options).unwrap().name(), expected);
    }

    #[rstest]
    #[case(options("splunk", None, None))]
    #[case(options("elasticsearch", Some("http://es:9200"), None))]
    #[case(options("elasticsearch", None, Some("scans")))]
    #[case(options("loki", Some("  "), None))]
    #[case(options("prometheus", None, None))]
    fn test_build_rejects(#[case] options: ReporterOptions) {
        let err = build(&options).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Config(_)));
    }
}
