// File digests: EOF integrity check and the hashcheck utility

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ring::digest;
use serde::Serialize;

use crate::common::error::{Error, Result};

/// Length of the SHA-256 digest carried in EOF packets
pub const DIGEST_LEN: usize = 32;

/// Read buffer used when hashing whole files
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Sha1,
    Blake3,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Blake3 => "blake3",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(Error::Config(format!("Unsupported hash algorithm: {}", other))),
        }
    }
}

enum Hasher {
    Ring(digest::Context),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algo: HashAlgorithm) -> Self {
        match algo {
            HashAlgorithm::Sha256 => Hasher::Ring(digest::Context::new(&digest::SHA256)),
            HashAlgorithm::Sha384 => Hasher::Ring(digest::Context::new(&digest::SHA384)),
            HashAlgorithm::Sha512 => Hasher::Ring(digest::Context::new(&digest::SHA512)),
            HashAlgorithm::Sha1 => {
                Hasher::Ring(digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY))
            }
            HashAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Ring(ctx) => ctx.update(data),
            Hasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finish(self) -> Vec<u8> {
        match self {
            Hasher::Ring(ctx) => ctx.finish().as_ref().to_vec(),
            Hasher::Blake3(hasher) => hasher.finalize().as_bytes().to_vec(),
        }
    }
}

/// Hash everything `reader` yields
pub fn hash_reader<R: Read>(mut reader: R, algo: HashAlgorithm) -> Result<Vec<u8>> {
    let mut hasher = Hasher::new(algo);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finish())
}

/// Compute the digest of a file
///
/// # Arguments
/// * `path` - File to hash
/// * `algo` - Digest algorithm
///
/// # Returns
/// The raw digest bytes
pub fn compute_file_hash(path: &Path, algo: HashAlgorithm) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    hash_reader(file, algo)
}

/// Result of comparing two files by digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match { digest: String },
    Mismatch { first: String, second: String },
    Missing(PathBuf),
}

impl Comparison {
    /// 0 on match, 1 on mismatch, 2 when a file is missing
    pub fn exit_code(&self) -> i32 {
        match self {
            Comparison::Match { .. } => 0,
            Comparison::Mismatch { .. } => 1,
            Comparison::Missing(_) => 2,
        }
    }
}

/// Digest both files with `algo` and compare
pub fn compare_files(first: &Path, second: &Path, algo: HashAlgorithm) -> Result<Comparison> {
    for path in [first, second] {
        if !path.is_file() {
            return Ok(Comparison::Missing(path.to_path_buf()));
        }
    }

    let a = hex::encode(compute_file_hash(first, algo)?);
    let b = hex::encode(compute_file_hash(second, algo)?);

    log::debug!("{} {}: {}", algo, first.display(), a);
    log::debug!("{} {}: {}", algo, second.display(), b);

    if a == b {
        Ok(Comparison::Match { digest: a })
    } else {
        Ok(Comparison::Mismatch { first: a, second: b })
    }
}

/// Incremental SHA-256 over a byte stream, used for the EOF digest
pub struct FileDigest {
    ctx: digest::Context,
}

impl FileDigest {
    pub fn new() -> Self {
        Self {
            ctx: digest::Context::new(&digest::SHA256),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.ctx.update(data);
    }

    /// Digest of everything fed so far; the running state is kept
    pub fn current(&self) -> Vec<u8> {
        self.ctx.clone().finish().as_ref().to_vec()
    }

    pub fn finish(self) -> Vec<u8> {
        self.ctx.finish().as_ref().to_vec()
    }
}

impl Default for FileDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a received digest against the locally computed one
pub fn verify_digest(expected: &[u8], actual: &[u8]) -> Result<()> {
    if expected != actual {
        return Err(Error::DigestMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}
