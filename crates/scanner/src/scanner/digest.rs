use super::Scanner;
use crate::error::{ErrorKind, Result};
use crate::{DigestAlgorithm, DigestFinding, Finding, ScanContext};
use async_trait::async_trait;
use exn::ResultExt;
use sha2::Digest;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

enum Hasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}
impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            DigestAlgorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(h) => h.update(chunk),
            Self::Sha1(h) => h.update(chunk),
            Self::Sha256(h) => h.update(chunk),
            Self::Sha512(h) => h.update(chunk),
            Self::Blake3(h) => {
                h.update(chunk);
            },
        }
    }

    fn finalize(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Compute every requested digest of a reader in a single pass.
pub fn digest_reader(mut reader: impl Read, algorithms: &BTreeSet<DigestAlgorithm>) -> io::Result<DigestFinding> {
    let mut hashers: Vec<(DigestAlgorithm, Hasher)> = algorithms.iter().map(|a| (*a, Hasher::new(*a))).collect();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for (_, hasher) in &mut hashers {
            hasher.update(&buffer[..read]);
        }
    }
    Ok(hashers.into_iter().map(|(algorithm, hasher)| (algorithm, hasher.finalize())).collect())
}

/// Compute every requested digest of a file in a single pass.
pub fn digest_file(path: &Path, algorithms: &BTreeSet<DigestAlgorithm>) -> io::Result<DigestFinding> {
    digest_reader(File::open(path)?, algorithms)
}

/// Always-enabled capability computing the configured digests.
///
/// Runs first in the standard chain; everything digest-dependent reads
/// [`ScanContext::hashes`] afterwards.
#[derive(Clone, Debug)]
pub struct DigestScanner {
    algorithms: BTreeSet<DigestAlgorithm>,
}
impl DigestScanner {
    pub const NAME: &'static str = "hashes";

    pub fn new(algorithms: impl IntoIterator<Item = DigestAlgorithm>) -> Result<Self> {
        let algorithms: BTreeSet<_> = algorithms.into_iter().collect();
        if algorithms.is_empty() {
            exn::bail!(ErrorKind::Config("at least one digest algorithm is required".to_string()));
        }
        Ok(Self { algorithms })
    }

    pub fn algorithms(&self) -> impl Iterator<Item = DigestAlgorithm> + '_ {
        self.algorithms.iter().copied()
    }
}

#[async_trait]
impl Scanner for DigestScanner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        true
    }

    #[tracing::instrument(name = "digest", skip_all, fields(key = %ctx.key))]
    async fn scan(&self, ctx: &mut ScanContext) -> Result<Finding> {
        let path = ctx.local_path.clone();
        let algorithms = self.algorithms.clone();
        let hashes = tokio::task::spawn_blocking(move || {
            digest_file(&path, &algorithms).or_raise(|| ErrorKind::Read(path.clone()))
        })
        .await
        .or_raise(|| ErrorKind::Task)??;
        ctx.hashes = hashes.clone();
        Ok(Finding::Digest(hashes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::UtcDateTime;
    use warden_storage::ObjectInfo;

    fn all() -> BTreeSet<DigestAlgorithm> {
        DigestAlgorithm::ALL.into_iter().collect()
    }

    #[rstest]
    #[case(DigestAlgorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e")]
    #[case(DigestAlgorithm::Sha1, "da39a3ee5e6b4b0d3255bfef95601890afd80709")]
    #[case(DigestAlgorithm::Sha256, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")]
    #[case(
        DigestAlgorithm::Sha512,
        "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
    )]
    #[case(DigestAlgorithm::Blake3, "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262")]
    fn test_empty_input(#[case] algorithm: DigestAlgorithm, #[case] expected: &str) {
        let digests = digest_reader(io::empty(), &all()).unwrap();
        assert_eq!(digests[&algorithm], expected);
    }

    #[rstest]
    #[case(DigestAlgorithm::Md5, "900150983cd24fb0d6963f7d28e17f72")]
    #[case(DigestAlgorithm::Sha1, "a9993e364706816aba3e25717850c26c9cd0d89d")]
    #[case(DigestAlgorithm::Sha256, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")]
    fn test_abc(#[case] algorithm: DigestAlgorithm, #[case] expected: &str) {
        let digests = digest_reader(&b"abc"[..], &all()).unwrap();
        assert_eq!(digests[&algorithm], expected);
    }

    #[test]
    fn test_large_input_spans_buffers() {
        let data = vec![0x5au8; BUFFER_SIZE * 3 + 17];
        let one_pass = digest_reader(&data[..], &all()).unwrap();
        assert_eq!(one_pass[&DigestAlgorithm::Blake3], blake3::hash(&data).to_hex().to_string());
        assert_eq!(one_pass[&DigestAlgorithm::Sha256], hex::encode(sha2::Sha256::digest(&data)));
    }

    #[test]
    fn test_requires_an_algorithm() {
        assert!(DigestScanner::new([]).is_err());
    }

    #[tokio::test]
    async fn test_scan_populates_exactly_configured_hashes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let object = ObjectInfo::new("uploads", "empty.bin", "\"e\"", UtcDateTime::now(), 0);
        let mut ctx = ScanContext::new(&object, file.path());
        let scanner = DigestScanner::new(DigestAlgorithm::DEFAULT).unwrap();
        let finding = scanner.scan(&mut ctx).await.unwrap();

        let algorithms: Vec<_> = ctx.hashes.keys().copied().collect();
        assert_eq!(algorithms, DigestAlgorithm::DEFAULT);
        assert_eq!(ctx.hashes[&DigestAlgorithm::Md5], "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(finding, Finding::Digest(ctx.hashes.clone()));
    }

    #[tokio::test]
    async fn test_scan_missing_file() {
        let object = ObjectInfo::new("uploads", "gone.bin", "\"e\"", UtcDateTime::now(), 0);
        let mut ctx = ScanContext::new(&object, "/nonexistent/warden/gone.bin");
        let scanner = DigestScanner::new(DigestAlgorithm::DEFAULT).unwrap();
        let err = scanner.scan(&mut ctx).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Read(_)));
        assert!(ctx.hashes.is_empty());
    }
}
