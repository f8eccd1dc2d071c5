//! One incremental scan pass over a bucket.
//!
//! The caller lists the bucket up front and hands the complete job set to a
//! [`Pool`]. Workers then take objects off a shared queue and, per object:
//!
//! 1. skip it if the ledger already covers its identity and modification time
//! 2. download it to a temporary file in the staging directory
//! 3. run the scanner chain over the local copy
//! 4. hand the resulting context to the reporter
//! 5. record the identity and scan time in the ledger
//! 6. remove the temporary file
//!
//! No error crosses a job boundary; the pass always runs to completion (or
//! cancellation) and returns a [`Summary`].

pub mod error;
mod job;
mod pool;
mod summary;

pub use crate::job::{Outcome, Recorded};
pub use crate::pool::{Pool, PoolOptions};
pub use crate::summary::Summary;
