//! Scanner Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A scanner error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading the local copy of an object failed
    #[display("cannot read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A capability that needs digests ran before any were computed
    #[display("no digests available for {_0}")]
    MissingDigests(#[error(not(source))] String),
    /// The reputation service could not be reached (connection, timeout)
    #[display("reputation lookup failed: {_0}")]
    Network(#[error(not(source))] String),
    /// The reputation service answered with a non-success status
    #[display("reputation service returned HTTP {_0}")]
    Status(#[error(not(source))] u16),
    /// The reputation service answered with something that isn't JSON
    #[display("malformed reputation response")]
    InvalidResponse,
    /// The rule engine failed for every loaded rule file
    #[display("rule engine failed for all {_0} rule files")]
    RuleEngine(#[error(not(source))] usize),
    /// Unknown digest algorithm name
    #[display("unknown digest algorithm: {_0}")]
    UnknownAlgorithm(#[error(not(source))] String),
    /// Two capabilities in one chain share a name
    #[display("duplicate scanner name: {_0}")]
    DuplicateScanner(#[error(not(source))] String),
    /// Invalid capability configuration
    #[display("invalid scanner configuration: {_0}")]
    Config(#[error(not(source))] String),
    /// A blocking task panicked or was cancelled
    #[display("background task failed")]
    Task,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}
