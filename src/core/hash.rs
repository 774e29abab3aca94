use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error while hashing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Lowercase hex SHA-256 of a file's content (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the digest of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest(format!("{:x}", hasher.finalize()))
}

/// Compute the digest of a file, streaming it in 8KB chunks.
pub fn hash_file(file_path: &Path) -> Result<Digest, HashError> {
    let io_err = |source| HashError::Io {
        path: file_path.display().to_string(),
        source,
    };

    let file = File::open(file_path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(io_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Digest(format!("{:x}", hasher.finalize())))
}

/// Hash many files in parallel. Output order matches input order.
pub fn hash_files_batch(file_paths: &[&Path]) -> Vec<Result<Digest, HashError>> {
    use rayon::prelude::*;

    file_paths.par_iter().map(|path| hash_file(path)).collect()
}

/// Two batch positions sharing one digest, `first < second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DuplicatePair {
    pub first: usize,
    pub second: usize,
}

/// Groups batch positions by digest.
#[derive(Debug, Default)]
pub struct HashIndex {
    by_digest: HashMap<Digest, Vec<usize>>,
}

impl HashIndex {
    pub fn build<'a, I>(digests: I) -> Self
    where
        I: IntoIterator<Item = &'a Digest>,
    {
        let mut by_digest: HashMap<Digest, Vec<usize>> = HashMap::new();
        for (position, digest) in digests.into_iter().enumerate() {
            by_digest.entry(digest.clone()).or_default().push(position);
        }
        Self { by_digest }
    }

    /// Every pair of positions with identical content. Purely informational:
    /// duplicates still take part in comparison.
    pub fn find_duplicates(&self) -> BTreeSet<DuplicatePair> {
        let mut pairs = BTreeSet::new();
        for positions in self.by_digest.values().filter(|v| v.len() > 1) {
            for (i, &first) in positions.iter().enumerate() {
                for &second in &positions[i + 1..] {
                    pairs.insert(DuplicatePair { first, second });
                }
            }
        }
        pairs
    }
}
