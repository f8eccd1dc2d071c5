use super::{deliver, http_client, required};
use crate::error::Result;
use crate::{Reporter, ReporterOptions};
use async_trait::async_trait;
use std::fmt::Write;
use time::UtcDateTime;
use warden_scanner::ScanContext;

/// Pushes per-object gauges to a Prometheus push gateway:
/// `POST {url}/metrics/job/<job>` in the text exposition format.
#[derive(Clone, Debug)]
pub struct PrometheusReporter {
    client: reqwest::Client,
    endpoint: String,
}
impl PrometheusReporter {
    pub fn new(options: &ReporterOptions) -> Result<Self> {
        let url = required(&options.url, "url", "prometheus")?;
        Ok(Self {
            client: http_client(options.timeout_secs)?,
            endpoint: format!("{}/metrics/job/{}", url.trim_end_matches('/'), options.job),
        })
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', "\\\"").replace('\n', r"\n")
}

/// Render the exposition text for one scanned object.
pub(crate) fn exposition(ctx: &ScanContext, at: UtcDateTime) -> String {
    let labels = format!("bucket=\"{}\",key=\"{}\"", escape(&ctx.bucket), escape(&ctx.key));
    let mut text = String::new();
    // Writing into a String cannot fail.
    _ = writeln!(text, "# HELP warden_object_size_bytes Size of the scanned object in bytes");
    _ = writeln!(text, "# TYPE warden_object_size_bytes gauge");
    _ = writeln!(text, "warden_object_size_bytes{{{labels}}} {}", ctx.size);
    _ = writeln!(text, "# HELP warden_object_scan_timestamp_seconds When the object was last scanned");
    _ = writeln!(text, "# TYPE warden_object_scan_timestamp_seconds gauge");
    _ = writeln!(text, "warden_object_scan_timestamp_seconds{{{labels}}} {}", at.unix_timestamp());
    let verdicts: Vec<_> =
        ctx.findings.iter().filter_map(|(name, finding)| finding.matched().map(|m| (name, m))).collect();
    if !verdicts.is_empty() {
        _ = writeln!(text, "# HELP warden_scanner_matched Whether a scanner flagged the object (1) or not (0)");
        _ = writeln!(text, "# TYPE warden_scanner_matched gauge");
        for (name, matched) in verdicts {
            _ = writeln!(text, "warden_scanner_matched{{{labels},scanner=\"{}\"}} {}", escape(name), u8::from(matched));
        }
    }
    text
}

#[async_trait]
impl Reporter for PrometheusReporter {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    async fn report(&self, ctx: &ScanContext) -> Result<()> {
        let body = exposition(ctx, UtcDateTime::now());
        let request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(body);
        deliver(&self.endpoint, request).await
    }
}
