//! Pool Error Types
//!
//! Nothing in here escapes a job: every error is logged against the object
//! it happened to and folded into the run [`Summary`](crate::Summary).

use derive_more::{Display, Error};

/// A per-job error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for per-job steps.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("cannot consult the ledger")]
    Lookup,
    #[display("cannot download object")]
    Download,
    #[display("cannot deliver scan report")]
    Delivery,
    #[display("cannot record scan in the ledger")]
    Record,
    #[display("cannot remove staged download")]
    Cleanup,
}

impl ErrorKind {
    /// Returns `true` if the next pass might succeed where this one didn't.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lookup | Self::Download | Self::Delivery | Self::Record)
    }
}
