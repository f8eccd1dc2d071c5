//! Capability configuration.
//!
//! These are plain deserializable values; `warden-config` composes them into
//! the process configuration, and the chain reads them exactly once, at
//! construction.

use crate::DigestAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_REPUTATION_URL: &str = "https://otx.alienvault.com";

/// Configuration of every capability in the standard chain.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerOptions {
    /// Digest algorithms computed for every object
    pub digests: Vec<DigestAlgorithm>,
    pub indicators: IndicatorOptions,
    pub reputation: ReputationOptions,
    pub rules: RuleOptions,
}
impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            digests: DigestAlgorithm::DEFAULT.to_vec(),
            indicators: IndicatorOptions::default(),
            reputation: ReputationOptions::default(),
            rules: RuleOptions::default(),
        }
    }
}

/// Static indicator lists: `<path>/<algorithm>.txt`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorOptions {
    pub enabled: bool,
    pub path: PathBuf,
}
impl Default for IndicatorOptions {
    fn default() -> Self {
        Self { enabled: true, path: PathBuf::from("indicators") }
    }
}

/// Remote reputation lookups (AlienVault OTX).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ReputationOptions {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}
impl Default for ReputationOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: DEFAULT_REPUTATION_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Pattern rules evaluated by an external `yara` executable.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleOptions {
    pub enabled: bool,
    /// Directory holding `*.yar` / `*.yara` rule files
    pub path: PathBuf,
    /// Rule engine executable, either a name looked up on `PATH` or a path
    pub command: String,
    pub timeout_secs: u64,
}
impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("rules"),
            command: "yara".to_string(),
            timeout_secs: 60,
        }
    }
}
