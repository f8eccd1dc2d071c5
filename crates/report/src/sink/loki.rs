use super::{deliver, http_client, required};
use crate::error::Result;
use crate::{Reporter, ReporterOptions, ScanReport};
use async_trait::async_trait;
use serde_json::json;
use time::UtcDateTime;
use warden_scanner::ScanContext;

/// Pushes each report as a log line: `POST {url}/loki/api/v1/push`, one
/// stream labelled `job=<job>`.
#[derive(Clone, Debug)]
pub struct LokiReporter {
    client: reqwest::Client,
    endpoint: String,
    job: String,
}
impl LokiReporter {
    pub fn new(options: &ReporterOptions) -> Result<Self> {
        let url = required(&options.url, "url", "loki")?;
        Ok(Self {
            client: http_client(options.timeout_secs)?,
            endpoint: format!("{}/loki/api/v1/push", url.trim_end_matches('/')),
            job: options.job.clone(),
        })
    }

    fn payload(&self, document: &ScanReport<'_>, at: UtcDateTime) -> Result<serde_json::Value> {
        Ok(json!({
            "streams": [{
                "stream": { "job": self.job },
                "values": [[at.unix_timestamp_nanos().to_string(), document.to_json()?]],
            }]
        }))
    }
}

#[async_trait]
impl Reporter for LokiReporter {
    fn name(&self) -> &'static str {
        "loki"
    }

    async fn report(&self, ctx: &ScanContext) -> Result<()> {
        let now = UtcDateTime::now();
        let document = ScanReport::new(ctx, now)?;
        let payload = self.payload(&document, now)?;
        deliver(&self.endpoint, self.client.post(&self.endpoint).json(&payload)).await
    }
}
