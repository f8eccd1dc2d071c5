use crate::error::{Error, ErrorKind};
use derive_more::Display;
use exn::ResultExt;
use std::str::FromStr;
use time::UtcDateTime;

/// Out-of-band processing status of a ledger record.
///
/// The scan pipeline only ever writes [`Unset`](Self::Unset) (on first
/// sighting); the other values are for external tooling.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    #[default]
    #[display("")]
    Unset,
    #[display("pending")]
    Pending,
    #[display("scanned")]
    Scanned,
    #[display("failed")]
    Failed,
}
impl FromStr for ScanStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Ok(Self::Unset),
            "pending" => Ok(Self::Pending),
            "scanned" => Ok(Self::Scanned),
            "failed" => Ok(Self::Failed),
            _ => exn::bail!(ErrorKind::InvalidData("scan status")),
        }
    }
}

/// The ledger's memory of one object.
///
/// Timestamps are stored at whole-second precision; anything read back from
/// the ledger has its nanoseconds stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRecord {
    pub bucket: String,
    pub key: String,
    /// Content identity (ETag) seen when the object was last scanned
    pub etag: String,
    pub status: ScanStatus,
    pub scanned_at: UtcDateTime,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
    pub deleted_at: Option<UtcDateTime>,
}
impl ScanRecord {
    /// Whether this record already covers an object listed with the given
    /// content identity and modification time, i.e. the object can be
    /// skipped.
    ///
    /// Skips iff the identity is unchanged AND the last scan is not older
    /// than the object's modification time. Both sides are compared at
    /// whole-second precision, so an object modified within the same second
    /// it was scanned still counts as covered.
    ///
    /// An empty identity never covers anything: without an ETag there is no
    /// way to tell whether the content changed.
    pub fn covers(&self, etag: &str, last_modified: UtcDateTime) -> bool {
        !etag.is_empty()
            && self.etag == etag
            && self.scanned_at.unix_timestamp() >= last_modified.unix_timestamp()
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    bucket: String,
    object_key: String,
    etag: String,
    status: String,
    scanned_at: i64,
    created_at: i64,
    updated_at: i64,
    deleted_at: Option<i64>,
}

fn timestamp(seconds: i64, field: &'static str) -> Result<UtcDateTime, Error> {
    UtcDateTime::from_unix_timestamp(seconds).or_raise(|| ErrorKind::InvalidData(field))
}

impl TryFrom<RecordRow> for ScanRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            bucket: row.bucket,
            key: row.object_key,
            etag: row.etag,
            status: row.status.parse()?,
            scanned_at: timestamp(row.scanned_at, "scan time")?,
            created_at: timestamp(row.created_at, "creation time")?,
            updated_at: timestamp(row.updated_at, "update time")?,
            deleted_at: row.deleted_at.map(|t| timestamp(t, "deletion time")).transpose()?,
        })
    }
}
