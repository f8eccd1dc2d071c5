mod elasticsearch;
mod json;
mod loki;
mod prometheus;

pub use self::elasticsearch::ElasticsearchReporter;
pub use self::json::JsonReporter;
pub use self::loki::LokiReporter;
pub use self::prometheus::PrometheusReporter;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::time::Duration;

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
        .build()
        .or_raise(|| ErrorKind::Config("cannot build HTTP client".to_string()))
}

/// Send a prepared request to `endpoint`, mapping transport errors and
/// non-2xx statuses.
pub(crate) async fn deliver(endpoint: &str, request: reqwest::RequestBuilder) -> Result<()> {
    let response = request.send().await.or_raise(|| ErrorKind::Network(endpoint.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        exn::bail!(ErrorKind::Status(status.as_u16()));
    }
    Ok(())
}

pub(crate) fn required(value: &Option<String>, field: &str, kind: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => exn::bail!(ErrorKind::Config(format!("`{field}` is required for the {kind} reporter"))),
    }
}
