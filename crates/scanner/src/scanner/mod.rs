//! The capability contract and the standard capabilities.

mod digest;
mod indicator;
mod reputation;
mod rules;

pub use self::digest::{DigestScanner, digest_file, digest_reader};
pub use self::indicator::IndicatorScanner;
pub use self::reputation::ReputationScanner;
pub use self::rules::{RuleScanner, RulesDisabled};
use crate::error::Result;
use crate::{Finding, ScanContext};
use async_trait::async_trait;

/// A named, independently enable-able unit of analysis over one object.
///
/// The chain records whatever [`scan()`](Self::scan) returns under
/// [`name()`](Self::name). Returning `Ok` with a non-matching result is the
/// normal "nothing found" case; `Err` is reserved for the capability being
/// unable to reach a verdict.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Stable identifier, unique within a chain; the findings key.
    fn name(&self) -> &'static str;

    /// Fixed at construction from configuration and environment
    /// preconditions. Disabled capabilities are never invoked.
    fn enabled(&self) -> bool;

    async fn scan(&self, ctx: &mut ScanContext) -> Result<Finding>;
}
