//! Lightweight sampled fingerprints
//!
//! [`light_hash`] reads a handful of evenly spaced chunks instead of the
//! whole stream, seeded with the stream length. It is meant for cheaply
//! telling large files apart and offers no cryptographic guarantee: changes
//! that fall between sampled chunks go unnoticed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{ChurnError, Result};

/// Default number of sampled chunks
pub const DEFAULT_READS: u64 = 20;

/// Default sampled chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgo {
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl HashAlgo {
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgo::Sha256 | HashAlgo::Blake3 => 32,
            HashAlgo::Sha384 => 48,
            HashAlgo::Sha512 => 64,
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            HashAlgo::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgo::Sha384 => Hasher::Sha384(Sha384::new()),
            HashAlgo::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgo::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha384(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
            Hasher::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

/// Full digest of `data`.
pub fn hash_bytes(algo: HashAlgo, data: &[u8]) -> Vec<u8> {
    let mut hasher = algo.hasher();
    hasher.update(data);
    hasher.finalize()
}

/// Hashes `reads` evenly spaced chunks of `chunk_size` bytes.
///
/// The digest is seeded with the hash of the stream length in decimal, so
/// streams of different lengths never share a fingerprint by accident. After
/// each chunk the stream skips forward `len / reads` bytes. The stream is
/// rewound to its start before returning.
pub fn light_hash<R: Read + Seek>(
    stream: &mut R,
    algo: HashAlgo,
    reads: u64,
    chunk_size: usize,
) -> Result<Vec<u8>> {
    if reads == 0 || chunk_size == 0 {
        return Err(ChurnError::invalid_argument(
            "read count and chunk size must be positive",
        ));
    }

    let len = stream
        .seek(SeekFrom::End(0))
        .map_err(|e| ChurnError::stream("failed to measure stream", e))?;
    if len == 0 {
        return Err(ChurnError::invalid_argument("Stream not readable: stream is empty"));
    }

    let mut hasher = algo.hasher();
    hasher.update(&hash_bytes(algo, len.to_string().as_bytes()));

    let skip = i64::try_from(len / reads)
        .map_err(|_| ChurnError::invalid_argument("stream too long to sample"))?;
    let mut chunk = vec![0u8; chunk_size];
    stream
        .seek(SeekFrom::Start(0))
        .map_err(|e| ChurnError::stream("failed to rewind stream", e))?;

    loop {
        let read = stream
            .read(&mut chunk)
            .map_err(|e| ChurnError::stream("failed to read sample", e))?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
        stream
            .seek(SeekFrom::Current(skip))
            .map_err(|e| ChurnError::stream("failed to skip between samples", e))?;
    }

    stream
        .seek(SeekFrom::Start(0))
        .map_err(|e| ChurnError::stream("failed to rewind stream", e))?;
    Ok(hasher.finalize())
}

/// [`light_hash`] over a file.
pub fn light_hash_file(
    path: &Path,
    algo: HashAlgo,
    reads: u64,
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| ChurnError::path("open", path, e))?;
    light_hash(&mut file, algo, reads, chunk_size)
        .map_err(|e| e.with_context(format!("failed to fingerprint {}", path.display())))
}
