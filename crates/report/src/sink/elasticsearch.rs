use super::{deliver, http_client, required};
use crate::error::Result;
use crate::{Reporter, ReporterOptions, ScanReport};
use async_trait::async_trait;
use time::UtcDateTime;
use warden_scanner::ScanContext;

/// Indexes each report as a document: `POST {url}/{index}/_doc`.
#[derive(Clone, Debug)]
pub struct ElasticsearchReporter {
    client: reqwest::Client,
    endpoint: String,
}
impl ElasticsearchReporter {
    pub fn new(options: &ReporterOptions) -> Result<Self> {
        let url = required(&options.url, "url", "elasticsearch")?;
        let index = required(&options.index, "index", "elasticsearch")?;
        Ok(Self {
            client: http_client(options.timeout_secs)?,
            endpoint: format!("{}/{}/_doc", url.trim_end_matches('/'), index),
        })
    }
}

#[async_trait]
impl Reporter for ElasticsearchReporter {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn report(&self, ctx: &ScanContext) -> Result<()> {
        let document = ScanReport::new(ctx, UtcDateTime::now())?;
        deliver(&self.endpoint, self.client.post(&self.endpoint).json(&document)).await
    }
}
