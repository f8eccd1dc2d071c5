use crate::error::{Error, ErrorKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A content digest algorithm.
///
/// Variants are declared weakest first, so the derived [`Ord`] doubles as a
/// strength ordering (`md5 < sha1 < sha256 < sha512 < blake3`).
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[display("md5")]
    Md5,
    #[display("sha1")]
    Sha1,
    #[display("sha256")]
    Sha256,
    #[display("sha512")]
    Sha512,
    #[display("blake3")]
    Blake3,
}

impl DigestAlgorithm {
    pub const ALL: [Self; 5] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512, Self::Blake3];
    pub const DEFAULT: [Self; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    /// Length of the lowercase hex encoding of a digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 | Self::Blake3 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Whether `candidate` looks like a digest of this algorithm (lowercase
    /// hex of the right length).
    pub fn is_valid_hex(&self, candidate: &str) -> bool {
        candidate.len() == self.hex_len() && candidate.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" | "b3" => Ok(Self::Blake3),
            _ => exn::bail!(ErrorKind::UnknownAlgorithm(s.to_string())),
        }
    }
}
