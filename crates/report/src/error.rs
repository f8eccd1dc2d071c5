//! Report Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A reporting error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reporting operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The sink cannot be built from the given options (startup failure)
    #[display("invalid reporter configuration: {_0}")]
    Config(#[error(not(source))] String),
    /// The report document could not be rendered
    #[display("cannot serialize report")]
    Serialize,
    /// Writing to the local output failed
    #[display("cannot write report to {}", _0.display())]
    Output(#[error(not(source))] PathBuf),
    /// The sink could not be reached (connection, timeout)
    #[display("sink unreachable: {_0}")]
    Network(#[error(not(source))] String),
    /// The sink answered with a non-success status
    #[display("sink rejected report with HTTP {_0}")]
    Status(#[error(not(source))] u16),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Output(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Config(_) | Self::Serialize => false,
        }
    }
}
