//! Detection capabilities and the scanner chain.
//!
//! A [`Scanner`] is one named unit of analysis over a downloaded object. The
//! [`Engine`] owns an ordered list of them, fixed at construction, and runs
//! the enabled ones over a fresh [`ScanContext`] for every object:
//!
//! 1. `hashes`: every configured digest, in one pass over the bytes
//! 2. `indicators`: membership of those digests in static known-bad lists
//! 3. `reputation`: the strongest supported digest looked up on AlienVault OTX
//! 4. `rules`: YARA rule files evaluated by an external `yara` process
//!
//! Enablement is computed once from [`ScannerOptions`]; nothing is
//! re-checked while scanning.

mod algorithm;
mod context;
mod engine;
pub mod error;
mod finding;
mod options;
pub mod scanner;

pub use crate::algorithm::DigestAlgorithm;
pub use crate::context::ScanContext;
pub use crate::engine::Engine;
pub use crate::finding::{DigestFinding, Finding, Findings, IndicatorFinding, ReputationFinding, RuleFinding};
pub use crate::options::{
    DEFAULT_REPUTATION_URL, IndicatorOptions, ReputationOptions, RuleOptions, ScannerOptions,
};
pub use crate::scanner::Scanner;
