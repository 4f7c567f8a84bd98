// src/hash.rs

//! Configurable digest computation for file cataloging
//!
//! This module provides a unified interface over the digest algorithms the
//! file catalog supports:
//! - **SHA-256**: the default, matches most upstream checksum databases
//! - **SHA-1**, **SHA-512**, **MD5**: available for compatibility with
//!   ecosystems that still publish them
//!
//! All configured algorithms are applied in a single read pass per file via
//! [`MultiHasher`].

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

/// Digest algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha1,
    Sha512,
    Md5,
}

impl HashAlgorithm {
    /// Digest output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha1 => 20,
            Self::Sha512 => 64,
            Self::Md5 => 16,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
            Self::Sha512 => "sha512",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            "sha512" => Ok(Self::Sha512),
            "md5" => Ok(Self::Md5),
            _ => Err(format!("unknown hash algorithm: {}", s)),
        }
    }
}

/// A computed digest with its algorithm name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: String,
    pub value: String,
}

impl Digest {
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Digest {
            algorithm: algorithm.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

enum HasherState {
    Sha256(Sha256),
    Sha1(Sha1),
    Sha512(Sha512),
    Md5(Md5),
}

impl HasherState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha512(h) => h.update(data),
            HasherState::Md5(h) => h.update(data),
        }
    }

    fn finalize(self) -> String {
        match self {
            HasherState::Sha256(h) => format!("{:x}", h.finalize()),
            HasherState::Sha1(h) => format!("{:x}", h.finalize()),
            HasherState::Sha512(h) => format!("{:x}", h.finalize()),
            HasherState::Md5(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Applies several digest algorithms over one stream of data
pub struct MultiHasher {
    states: Vec<(HashAlgorithm, HasherState)>,
}

impl MultiHasher {
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        MultiHasher {
            states: algorithms
                .iter()
                .map(|a| (*a, HasherState::new(*a)))
                .collect(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, state) in &mut self.states {
            state.update(data);
        }
    }

    pub fn finalize(self) -> Vec<Digest> {
        self.states
            .into_iter()
            .map(|(algorithm, state)| Digest::new(algorithm.name(), state.finalize()))
            .collect()
    }
}

/// Normalize a hasher list: sorted, deduplicated.
pub fn normalize_hashers(algorithms: &[HashAlgorithm]) -> Vec<HashAlgorithm> {
    let mut out = algorithms.to_vec();
    out.sort();
    out.dedup();
    out
}

/// Digest a full reader with every configured algorithm in one pass.
pub fn digests_from_reader<R: Read>(
    algorithms: &[HashAlgorithm],
    reader: &mut R,
) -> io::Result<Vec<Digest>> {
    let mut hasher = MultiHasher::new(algorithms);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Digest a byte slice with a single algorithm.
pub fn digest_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Digest {
    let mut state = HasherState::new(algorithm);
    state.update(data);
    Digest::new(algorithm.name(), state.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let digest = digest_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(
            digest.value,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(digest.algorithm, "sha256");
    }

    #[test]
    fn test_md5_known_value() {
        let digest = digest_bytes(HashAlgorithm::Md5, b"hello");
        assert_eq!(digest.value, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_sha1_known_value() {
        let digest = digest_bytes(HashAlgorithm::Sha1, b"hello");
        assert_eq!(digest.value, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn test_single_pass_matches_per_algorithm() {
        let data = b"stream me through all hashers at once";
        let algorithms = [
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha1,
            HashAlgorithm::Md5,
        ];

        let mut cursor = io::Cursor::new(&data[..]);
        let combined = digests_from_reader(&algorithms, &mut cursor).unwrap();

        assert_eq!(combined.len(), 3);
        for digest in &combined {
            let algorithm: HashAlgorithm = digest.algorithm.parse().unwrap();
            assert_eq!(digest, &digest_bytes(algorithm, data));
        }
    }

    #[test]
    fn test_normalize_hashers_dedupes() {
        let normalized = normalize_hashers(&[
            HashAlgorithm::Md5,
            HashAlgorithm::Sha256,
            HashAlgorithm::Md5,
        ]);
        assert_eq!(normalized, vec![HashAlgorithm::Sha256, HashAlgorithm::Md5]);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }
}
