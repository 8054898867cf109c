//! Salt, pepper and cipher-key derivation
//!
//! - salt: SHA-256 of the plaintext, with its bytes reordered so the file
//!   name does not expose the raw content hash
//! - pepper: 32 random bytes per encryption, stored at the end of the
//!   container
//! - cipher key: SHA-256(pepper || secret || reversed salt)

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::codec::ByteCodec;
use crate::error::{ChurnError, Result};

/// Length of a salt in bytes
pub const SALT_LEN: usize = 32;

/// Length of a pepper in bytes
pub const PEPPER_LEN: usize = 32;

/// Length of a derived cipher key in bytes
pub const KEY_LEN: usize = 32;

/// Content-derived, non-secret diversifier. Equal plaintexts always share a salt.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Reorders a content hash into a salt: reverse the first 8 bytes, then
    /// everything from byte 5 on, then the whole array. Cosmetic only.
    pub fn from_content_hash(hash: [u8; SALT_LEN]) -> Self {
        let mut salt = hash;
        salt[..8].reverse();
        salt[5..].reverse();
        salt.reverse();
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses the 64-character hex form used in file names.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = ByteCodec::Hex
            .decode(text)
            .map_err(|e| e.with_context("salt is not valid hex"))?;
        let bytes: [u8; SALT_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            ChurnError::invalid_argument(format!(
                "salt must be {} bytes, got {}",
                SALT_LEN,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        ByteCodec::Hex.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex())
    }
}

/// Secret, random per-encryption value folded into the cipher key.
#[derive(Clone, PartialEq, Eq)]
pub struct Pepper([u8; PEPPER_LEN]);

impl Pepper {
    /// Draws a fresh pepper from the operating system's RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PEPPER_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; PEPPER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PEPPER_LEN] {
        &self.0
    }
}

impl Drop for Pepper {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Pepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pepper(..)")
    }
}

/// Key handed to a block-cipher backend. Wiped from memory on drop.
pub struct CipherKey([u8; KEY_LEN]);

impl CipherKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Hashes the whole of `source` and turns the digest into a salt.
///
/// The stream is read from the start and left rewound to the start.
pub fn derive_salt<R: Read + Seek>(source: &mut R) -> Result<Salt> {
    source
        .seek(SeekFrom::Start(0))
        .map_err(|e| ChurnError::stream("failed to rewind source before hashing", e))?;

    let mut hasher = Sha256::new();
    io::copy(source, &mut hasher)
        .map_err(|e| ChurnError::stream("failed to hash source content", e))?;

    source
        .seek(SeekFrom::Start(0))
        .map_err(|e| ChurnError::stream("failed to rewind source after hashing", e))?;

    Ok(Salt::from_content_hash(hasher.finalize().into()))
}

/// Combines secret, salt and pepper into a cipher key.
///
/// Identical inputs always give the same key; changing any of them gives an
/// unrelated one.
pub fn derive_key(secret: &[u8], salt: &Salt, pepper: &Pepper) -> CipherKey {
    let mut reversed_salt = salt.0;
    reversed_salt.reverse();

    let mut hasher = Sha256::new();
    hasher.update(pepper.as_bytes());
    hasher.update(secret);
    hasher.update(reversed_salt);
    CipherKey(hasher.finalize().into())
}
