use crate::{DigestAlgorithm, Findings};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use warden_storage::ObjectInfo;

/// Everything known about one object while it travels through the chain.
///
/// Created fresh per job, owned by exactly one worker, mutated in place by
/// each capability in chain order, and discarded after reporting.
#[derive(Clone, Debug)]
pub struct ScanContext {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    /// Local copy of the object's bytes
    pub local_path: PathBuf,
    /// Lowercase hex digests, filled in by the digest capability
    pub hashes: BTreeMap<DigestAlgorithm, String>,
    pub findings: Findings,
}
impl ScanContext {
    pub fn new(object: &ObjectInfo, local_path: impl Into<PathBuf>) -> Self {
        Self {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            size: object.size,
            local_path: local_path.into(),
            hashes: BTreeMap::new(),
            findings: Findings::default(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// The strongest digest held by the context among `supported`.
    pub fn strongest_hash(&self, supported: &[DigestAlgorithm]) -> Option<(DigestAlgorithm, &str)> {
        self.hashes
            .iter()
            .rev()
            .find(|(algorithm, _)| supported.contains(algorithm))
            .map(|(algorithm, digest)| (*algorithm, digest.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::UtcDateTime;

    #[test]
    fn test_strongest_hash() {
        let object = ObjectInfo::new("uploads", "a.bin", "\"e\"", UtcDateTime::now(), 0);
        let mut ctx = ScanContext::new(&object, "/tmp/a.bin");
        assert_eq!(ctx.strongest_hash(&DigestAlgorithm::ALL), None);

        ctx.hashes.insert(DigestAlgorithm::Md5, "m".to_string());
        ctx.hashes.insert(DigestAlgorithm::Sha1, "s1".to_string());
        ctx.hashes.insert(DigestAlgorithm::Blake3, "b".to_string());
        let supported = [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha256];
        assert_eq!(ctx.strongest_hash(&supported), Some((DigestAlgorithm::Sha1, "s1")));
        assert_eq!(ctx.strongest_hash(&[DigestAlgorithm::Sha512]), None);
    }
}
