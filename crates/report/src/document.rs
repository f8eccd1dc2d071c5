use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcDateTime};
use warden_scanner::{DigestAlgorithm, Findings, ScanContext};

/// The document every sink delivers for one scanned object.
#[derive(Debug, Serialize)]
pub struct ScanReport<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub size: u64,
    pub hashes: &'a BTreeMap<DigestAlgorithm, String>,
    /// RFC 3339, UTC
    pub scan_time: String,
    pub results: &'a Findings,
}
impl<'a> ScanReport<'a> {
    pub fn new(ctx: &'a ScanContext, scan_time: UtcDateTime) -> Result<Self> {
        let scan_time = OffsetDateTime::from_unix_timestamp_nanos(scan_time.unix_timestamp_nanos())
            .or_raise(|| ErrorKind::Serialize)?
            .format(&Rfc3339)
            .or_raise(|| ErrorKind::Serialize)?;
        Ok(Self {
            bucket: &ctx.bucket,
            key: &ctx.key,
            size: ctx.size,
            hashes: &ctx.hashes,
            scan_time,
            results: &ctx.findings,
        })
    }

    /// Single-line JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).or_raise(|| ErrorKind::Serialize)
    }
}
