//! SQLite ledger of previously scanned objects.
//!
//! The ledger remembers, per (bucket, key), the content identity (ETag) an
//! object had when it was last scanned and when that scan happened. A scan
//! pass consults it to skip objects that have not changed since.
//!
//! The ledger is not the source of truth for anything: deleting it only
//! means the next pass rescans everything.

mod db;
pub mod error;
mod ledger;
mod models;

pub use crate::db::Database;
pub use crate::ledger::{Ledger, Upsert};
pub use crate::models::{ScanRecord, ScanStatus};
