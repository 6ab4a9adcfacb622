//! ChaCha20-Poly1305 encryption at rest for a single column family key
//! version. Grounded on `harborgrid-justin-caddy`'s
//! `enterprise/crypto/symmetric.rs` `ChaCha20Poly1305Cipher`, trimmed to
//! the one cipher this spec uses and adapted to the core error taxonomy
//! instead of a local `thiserror` enum (library crates in this workspace
//! report through `remdb_core::error`).

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use remdb_core::error::{CResult, Error};

use crate::key::Key;

pub const NONCE_LEN: usize = 12;

/// Encrypts/decrypts values for one column family under one key version.
/// The wire format is `key_version(1) || nonce(12) || ciphertext+tag`.
pub struct Cipher {
    key_version: u8,
    cipher: ChaCha20Poly1305,
}

impl Cipher {
    pub fn new(key: &Key, key_version: u8) -> Self {
        let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .expect("Key is always 32 bytes, the size ChaCha20Poly1305 requires");
        Cipher { key_version, cipher }
    }

    pub fn key_version(&self) -> u8 {
        self.key_version
    }

    /// Encrypts `plaintext`, authenticating `aad` (typically the entity id
    /// or key bytes, binding the ciphertext to the row it was written for).
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> CResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|_| Error::internal("AEAD encryption failed"))?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        out.push(self.key_version);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a value sealed by [`Cipher::seal`] under this exact key
    /// version. Callers mismatching the key version (stale cache after
    /// rotation) or presenting the wrong `aad` get `KeyMismatch`, never a
    /// silently-wrong plaintext.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> CResult<Vec<u8>> {
        if sealed.len() < 1 + NONCE_LEN {
            return Err(Error::corruption("sealed value shorter than the AEAD envelope"));
        }
        let (version, rest) = sealed.split_at(1);
        if version[0] != self.key_version {
            return Err(Error::key_mismatch(format!(
                "sealed value was written with key version {} but cipher holds version {}",
                version[0], self.key_version
            )));
        }
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad })
            .map_err(|_| Error::key_mismatch("AEAD authentication failed (wrong key or associated data)"))
    }
}

/// Reads just the key-version prefix byte of a sealed value, so a
/// multi-version keyring can pick the right [`Cipher`] without attempting
/// decryption first.
pub fn peek_key_version(sealed: &[u8]) -> CResult<u8> {
    sealed.first().copied().ok_or_else(|| Error::corruption("sealed value is empty"))
}

#[cfg(test)]
mod test {
    use super::*;

    fn cipher() -> Cipher {
        Cipher::new(&Key::new([9u8; 32]), 1)
    }

    #[test]
    fn roundtrips_plaintext() {
        let c = cipher();
        let sealed = c.seal(b"hello tenant", b"aad").unwrap();
        assert_eq!(c.open(&sealed, b"aad").unwrap(), b"hello tenant");
    }

    #[test]
    fn wrong_aad_fails_with_key_mismatch() {
        let c = cipher();
        let sealed = c.seal(b"hello tenant", b"right-aad").unwrap();
        let err = c.open(&sealed, b"wrong-aad").unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::KeyMismatch);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let c = cipher();
        let mut sealed = c.seal(b"hello tenant", b"aad").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(c.open(&sealed, b"aad").is_err());
    }

    #[test]
    fn mismatched_key_version_is_detected_before_decryption() {
        let c1 = Cipher::new(&Key::new([9u8; 32]), 1);
        let c2 = Cipher::new(&Key::new([9u8; 32]), 2);
        let sealed = c1.seal(b"data", b"aad").unwrap();
        let err = c2.open(&sealed, b"aad").unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::KeyMismatch);
    }

    #[test]
    fn nonces_are_not_reused() {
        let c = cipher();
        let a = c.seal(b"data", b"aad").unwrap();
        let b = c.seal(b"data", b"aad").unwrap();
        assert_ne!(a, b);
    }
}
