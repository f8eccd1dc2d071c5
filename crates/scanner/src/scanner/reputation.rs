use super::Scanner;
use crate::error::{ErrorKind, Result};
use crate::{DigestAlgorithm, Finding, ReputationFinding, ReputationOptions, ScanContext};
use async_trait::async_trait;
use exn::ResultExt;
use std::time::Duration;

/// Digests the reputation service indexes, in no particular order.
const SUPPORTED: [DigestAlgorithm; 3] = [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha256];
const API_KEY_HEADER: &str = "X-OTX-API-KEY";

/// Looks up the strongest supported digest of an object against AlienVault
/// OTX.
///
/// Enabled only when the feature flag is set AND an API key is configured.
#[derive(Clone, Debug)]
pub struct ReputationScanner {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}
impl ReputationScanner {
    pub const NAME: &'static str = "reputation";

    pub fn new(options: &ReputationOptions) -> Result<Self> {
        let api_key = match (options.enabled, options.api_key.as_deref().map(str::trim)) {
            (false, _) => {
                tracing::info!(scanner = Self::NAME, "Disabled by configuration");
                None
            },
            (true, None | Some("")) => {
                tracing::warn!(scanner = Self::NAME, "Enabled but no API key configured; disabling");
                None
            },
            (true, Some(key)) => Some(key.to_string()),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Config("cannot build HTTP client".to_string()))?;
        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, digest: &str) -> String {
        format!("{}/api/v1/indicators/file/{}/general", self.base_url, digest)
    }
}

/// Interpret a service response body.
fn finding(raw: serde_json::Value, algorithm: DigestAlgorithm, indicator: &str) -> ReputationFinding {
    let pulse_count = raw.pointer("/pulse_info/count").and_then(serde_json::Value::as_u64).unwrap_or(0);
    ReputationFinding {
        matched: pulse_count > 0,
        pulse_count,
        indicator: indicator.to_string(),
        algorithm,
        raw,
    }
}

#[async_trait]
impl Scanner for ReputationScanner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    #[tracing::instrument(name = "reputation", skip_all, fields(key = %ctx.key))]
    async fn scan(&self, ctx: &mut ScanContext) -> Result<Finding> {
        let Some(api_key) = &self.api_key else {
            exn::bail!(ErrorKind::Config("reputation lookup invoked without an API key".to_string()));
        };
        let (algorithm, digest) =
            ctx.strongest_hash(&SUPPORTED).ok_or_else(|| exn::Exn::from(ErrorKind::MissingDigests(ctx.key.clone())))?;
        let response = self
            .client
            .get(self.url(digest))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(self.base_url.clone()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        let raw: serde_json::Value = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        let result = finding(raw, algorithm, digest);
        tracing::debug!(%algorithm, pulses = result.pulse_count, "Reputation lookup complete");
        Ok(Finding::Reputation(result))
    }
}
