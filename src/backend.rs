//! Authenticated block-cipher backends
//!
//! Two interchangeable AEAD variants sit behind [`BlockCipher`]: AES-256-GCM
//! (default) and AES-256-CCM. Both use 12-byte nonces and 16-byte tags, and
//! both are keyed with `SHA-256(derived key)` rather than the derived key
//! itself. [`Backend::new`] is the only way the engine obtains one.
//!
//! Key schedules are wiped when a backend is dropped.

use std::fmt;

use aes::Aes256;
use aes_gcm::Aes256Gcm;
use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit};
use ccm::Ccm;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::derive::{CipherKey, KEY_LEN};
use crate::error::{ChurnError, ErrorCategory, ErrorKind, Result};

/// Length of a nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of an authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Largest block CCM can seal with a 12-byte nonce (3-byte length field).
pub const CCM_MAX_BLOCK_LEN: u64 = (1 << 24) - 1;

/// Largest block GCM can seal under one nonce (32-bit block counter).
pub const GCM_MAX_BLOCK_LEN: u64 = (1 << 36) - 32;

pub type Tag = [u8; TAG_LEN];

type Aes256Ccm = Ccm<Aes256, U16, U12>;

/// Capability shared by every backend: seal or open one block under one nonce.
pub trait BlockCipher {
    /// Encrypts `plaintext`, returning ciphertext of equal length plus its tag.
    fn encrypt_block(&self, plaintext: &[u8], nonce: &[u8]) -> Result<(Vec<u8>, Tag)>;

    /// Decrypts `ciphertext` after checking `tag`.
    ///
    /// Fails with [`ErrorKind::AuthenticationFailed`] if the tag does not match.
    fn decrypt_block(&self, ciphertext: &[u8], tag: &Tag, nonce: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts without checking any tag.
    ///
    /// Both variants are counter-mode underneath, so running the encryption
    /// keystream over ciphertext yields the plaintext; the tag computed along
    /// the way is discarded.
    fn authless_decrypt_block(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_block(ciphertext, nonce)
            .map(|(plaintext, _)| plaintext)
    }
}

/// Selects one of the two backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Gcm,
    Ccm,
}

impl BackendKind {
    /// Largest plaintext block this variant accepts.
    pub fn max_block_len(self) -> u64 {
        match self {
            BackendKind::Gcm => GCM_MAX_BLOCK_LEN,
            BackendKind::Ccm => CCM_MAX_BLOCK_LEN,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gcm => f.write_str("AES-256-GCM"),
            BackendKind::Ccm => f.write_str("AES-256-CCM"),
        }
    }
}

/// A backend instance owned by a single churn.
pub enum Backend {
    Gcm(GcmBlockCipher),
    Ccm(CcmBlockCipher),
}

impl Backend {
    pub fn new(kind: BackendKind, key: &CipherKey) -> Self {
        match kind {
            BackendKind::Gcm => Backend::Gcm(GcmBlockCipher::new(key)),
            BackendKind::Ccm => Backend::Ccm(CcmBlockCipher::new(key)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Gcm(_) => BackendKind::Gcm,
            Backend::Ccm(_) => BackendKind::Ccm,
        }
    }
}

impl BlockCipher for Backend {
    fn encrypt_block(&self, plaintext: &[u8], nonce: &[u8]) -> Result<(Vec<u8>, Tag)> {
        match self {
            Backend::Gcm(inner) => inner.encrypt_block(plaintext, nonce),
            Backend::Ccm(inner) => inner.encrypt_block(plaintext, nonce),
        }
    }

    fn decrypt_block(&self, ciphertext: &[u8], tag: &Tag, nonce: &[u8]) -> Result<Vec<u8>> {
        match self {
            Backend::Gcm(inner) => inner.decrypt_block(ciphertext, tag, nonce),
            Backend::Ccm(inner) => inner.decrypt_block(ciphertext, tag, nonce),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend({})", self.kind())
    }
}

/// AES-256-GCM backend.
pub struct GcmBlockCipher {
    aead: Aes256Gcm,
}

impl GcmBlockCipher {
    pub fn new(key: &CipherKey) -> Self {
        let hashed = hash_key(key);
        Self {
            aead: Aes256Gcm::new(GenericArray::from_slice(&hashed[..])),
        }
    }
}

impl BlockCipher for GcmBlockCipher {
    fn encrypt_block(&self, plaintext: &[u8], nonce: &[u8]) -> Result<(Vec<u8>, Tag)> {
        seal(&self.aead, plaintext, nonce)
    }

    fn decrypt_block(&self, ciphertext: &[u8], tag: &Tag, nonce: &[u8]) -> Result<Vec<u8>> {
        open(&self.aead, ciphertext, tag, nonce)
    }
}

/// AES-256-CCM backend (16-byte tag, 12-byte nonce).
pub struct CcmBlockCipher {
    aead: Aes256Ccm,
}

impl CcmBlockCipher {
    pub fn new(key: &CipherKey) -> Self {
        let hashed = hash_key(key);
        Self {
            aead: Aes256Ccm::new(GenericArray::from_slice(&hashed[..])),
        }
    }
}

impl BlockCipher for CcmBlockCipher {
    fn encrypt_block(&self, plaintext: &[u8], nonce: &[u8]) -> Result<(Vec<u8>, Tag)> {
        seal(&self.aead, plaintext, nonce)
    }

    fn decrypt_block(&self, ciphertext: &[u8], tag: &Tag, nonce: &[u8]) -> Result<Vec<u8>> {
        open(&self.aead, ciphertext, tag, nonce)
    }
}

fn hash_key(key: &CipherKey) -> Zeroizing<[u8; KEY_LEN]> {
    Zeroizing::new(Sha256::digest(key.as_bytes()).into())
}

fn check_nonce(nonce: &[u8]) -> Result<()> {
    if nonce.len() == NONCE_LEN {
        return Ok(());
    }
    if nonce.len() > NONCE_LEN {
        Err(ChurnError::with_kind(
            ErrorCategory::User,
            ErrorKind::NonceExhausted,
            format!(
                "counter grew to {} bytes; the backend nonce is {} bytes",
                nonce.len(),
                NONCE_LEN
            ),
        ))
    } else {
        Err(ChurnError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("nonce must be {} bytes, got {}", NONCE_LEN, nonce.len()),
        ))
    }
}

fn seal<A>(aead: &A, plaintext: &[u8], nonce: &[u8]) -> Result<(Vec<u8>, Tag)>
where
    A: AeadInPlace + AeadCore<NonceSize = U12, TagSize = U16>,
{
    check_nonce(nonce)?;
    let mut buffer = plaintext.to_vec();
    let tag = aead
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| {
            ChurnError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedConfiguration,
                format!("backend refused to seal a {} byte block", plaintext.len()),
            )
        })?;
    Ok((buffer, tag.into()))
}

fn open<A>(aead: &A, ciphertext: &[u8], tag: &Tag, nonce: &[u8]) -> Result<Vec<u8>>
where
    A: AeadInPlace + AeadCore<NonceSize = U12, TagSize = U16>,
{
    check_nonce(nonce)?;
    let mut buffer = ciphertext.to_vec();
    aead.decrypt_in_place_detached(
        GenericArray::from_slice(nonce),
        b"",
        &mut buffer,
        GenericArray::from_slice(tag),
    )
    .map_err(|_| {
        ChurnError::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "corrupt input, tampered-with data, or wrong secret",
        )
    })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::{Pepper, Salt, derive_key};

    fn test_key(secret: &[u8]) -> CipherKey {
        derive_key(secret, &Salt::from_bytes([0x11; 32]), &Pepper::from_bytes([0x22; 32]))
    }

    fn nonce(n: u8) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[0] = n;
        nonce
    }

    fn backends(secret: &[u8]) -> [Backend; 2] {
        let key = test_key(secret);
        [Backend::new(BackendKind::Gcm, &key), Backend::new(BackendKind::Ccm, &key)]
    }

    #[test]
    fn test_roundtrip_both_variants() {
        for backend in backends(b"secret") {
            let plaintext = b"hello, block world";
            let (ciphertext, tag) = backend.encrypt_block(plaintext, &nonce(1)).unwrap();
            assert_eq!(ciphertext.len(), plaintext.len());
            assert_ne!(&ciphertext[..], &plaintext[..]);

            let decrypted = backend.decrypt_block(&ciphertext, &tag, &nonce(1)).unwrap();
            assert_eq!(&decrypted[..], &plaintext[..], "{:?}", backend);
        }
    }

    #[test]
    fn test_variants_differ() {
        let [gcm, ccm] = backends(b"secret");
        let (a, tag_a) = gcm.encrypt_block(b"same input", &nonce(1)).unwrap();
        let (b, tag_b) = ccm.encrypt_block(b"same input", &nonce(1)).unwrap();
        assert!(a != b || tag_a != tag_b);
    }

    #[test]
    fn test_authless_matches_plaintext() {
        for backend in backends(b"secret") {
            let (ciphertext, _) = backend.encrypt_block(b"symmetric", &nonce(7)).unwrap();
            let decrypted = backend.authless_decrypt_block(&ciphertext, &nonce(7)).unwrap();
            assert_eq!(&decrypted[..], b"symmetric");
        }
    }

    #[test]
    fn test_tampered_tag_fails() {
        for backend in backends(b"secret") {
            let (ciphertext, mut tag) = backend.encrypt_block(b"data", &nonce(1)).unwrap();
            tag[15] ^= 0x01;
            let err = backend
                .decrypt_block(&ciphertext, &tag, &nonce(1))
                .expect_err("tampered tag must fail");
            assert!(err.is_authentication_failure());
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        for backend in backends(b"secret") {
            let (mut ciphertext, tag) = backend.encrypt_block(b"data", &nonce(1)).unwrap();
            ciphertext[0] ^= 0x80;
            let err = backend
                .decrypt_block(&ciphertext, &tag, &nonce(1))
                .expect_err("tampered ciphertext must fail");
            assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        }
    }

    #[test]
    fn test_wrong_nonce_fails() {
        for backend in backends(b"secret") {
            let (ciphertext, tag) = backend.encrypt_block(b"data", &nonce(1)).unwrap();
            assert!(backend.decrypt_block(&ciphertext, &tag, &nonce(2)).is_err());
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let [gcm, ccm] = backends(b"right");
        let [other_gcm, other_ccm] = backends(b"wrong");
        for (sealer, opener) in [(gcm, other_gcm), (ccm, other_ccm)] {
            let (ciphertext, tag) = sealer.encrypt_block(b"data", &nonce(1)).unwrap();
            assert!(opener.decrypt_block(&ciphertext, &tag, &nonce(1)).is_err());
        }
    }

    #[test]
    fn test_grown_nonce_rejected() {
        for backend in backends(b"secret") {
            let err = backend
                .encrypt_block(b"data", &[0u8; NONCE_LEN + 1])
                .expect_err("13-byte nonce must fail");
            assert_eq!(err.kind, Some(ErrorKind::NonceExhausted));
        }
    }

    #[test]
    fn test_empty_block() {
        for backend in backends(b"secret") {
            let (ciphertext, tag) = backend.encrypt_block(b"", &nonce(1)).unwrap();
            assert!(ciphertext.is_empty());
            assert!(backend.decrypt_block(&ciphertext, &tag, &nonce(1)).unwrap().is_empty());
        }
    }
}
