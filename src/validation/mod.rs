// Validation module

pub mod hash;

pub use hash::{
    compare_files, compute_file_hash, hash_reader, verify_digest, Comparison, FileDigest,
    HashAlgorithm, DIGEST_LEN,
};
