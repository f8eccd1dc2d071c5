//! Structured capability results.

use crate::DigestAlgorithm;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Result of the digest capability: every configured digest of the object.
pub type DigestFinding = BTreeMap<DigestAlgorithm, String>;

/// Result of the static indicator capability.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndicatorFinding {
    pub matched: bool,
    /// Algorithms whose digest of the object is a known-bad indicator
    pub algorithms: Vec<DigestAlgorithm>,
}

/// Result of the reputation lookup capability.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ReputationFinding {
    pub matched: bool,
    /// Number of threat-intelligence pulses referencing the indicator
    pub pulse_count: u64,
    /// The digest that was looked up
    pub indicator: String,
    pub algorithm: DigestAlgorithm,
    /// Response body as returned by the service
    pub raw: serde_json::Value,
}

/// Result of the pattern rule capability.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RuleFinding {
    pub matched: bool,
    /// Distinct matched rule identifiers, sorted
    pub rules: Vec<String>,
    /// Rule files evaluated against the object
    pub rule_files: Vec<String>,
}

/// The structured result a capability records under its name.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Finding {
    Digest(DigestFinding),
    Indicator(IndicatorFinding),
    Reputation(ReputationFinding),
    Rules(RuleFinding),
}
impl Finding {
    /// Whether the capability flagged the object; `None` for capabilities
    /// that only describe it (digests).
    pub fn matched(&self) -> Option<bool> {
        match self {
            Self::Digest(_) => None,
            Self::Indicator(f) => Some(f.matched),
            Self::Reputation(f) => Some(f.matched),
            Self::Rules(f) => Some(f.matched),
        }
    }
}

/// Findings of one job, in chain order.
///
/// Serializes as a map from capability name to result, preserving the order
/// in which capabilities ran.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Findings(Vec<(String, Finding)>);
impl Findings {
    /// Record a result, replacing any earlier result under the same name.
    pub fn insert(&mut self, name: impl Into<String>, finding: Finding) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = finding,
            None => self.0.push((name, finding)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Finding> {
        self.0.iter().find(|(existing, _)| existing == name).map(|(_, finding)| finding)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Finding)> {
        self.0.iter().map(|(name, finding)| (name.as_str(), finding))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if any capability flagged the object.
    pub fn any_matched(&self) -> bool {
        self.0.iter().any(|(_, finding)| finding.matched() == Some(true))
    }
}
impl Serialize for Findings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, finding) in &self.0 {
            map.serialize_entry(name, finding)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_in_insertion_order() {
        let mut findings = Findings::default();
        findings.insert("rules", Finding::Rules(RuleFinding::default()));
        findings.insert(
            "indicators",
            Finding::Indicator(IndicatorFinding { matched: true, algorithms: vec![DigestAlgorithm::Sha256] }),
        );
        let text = serde_json::to_string(&findings).unwrap();
        assert!(text.find("\"rules\"").unwrap() < text.find("\"indicators\"").unwrap());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["indicators"], json!({"matched": true, "algorithms": ["sha256"]}));
        assert_eq!(value["rules"], json!({"matched": false, "rules": [], "rule_files": []}));
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut findings = Findings::default();
        findings.insert("rules", Finding::Rules(RuleFinding::default()));
        findings.insert("rules", Finding::Rules(RuleFinding { matched: true, ..Default::default() }));
        assert_eq!(findings.len(), 1);
        assert!(findings.any_matched());
    }

    #[test]
    fn test_digest_finding_is_not_a_match() {
        let mut digests = DigestFinding::new();
        digests.insert(DigestAlgorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e".to_string());
        let finding = Finding::Digest(digests);
        assert_eq!(finding.matched(), None);
        assert_eq!(serde_json::to_value(&finding).unwrap(), json!({"md5": "d41d8cd98f00b204e9800998ecf8427e"}));
    }
}
