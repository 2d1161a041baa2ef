//! Key derivation and authenticated encryption of record payloads.
//!
//! Keys are PBKDF2-HMAC-SHA256 outputs (empty salt, 100 000 rounds) and
//! payloads are sealed with AES-256-GCM. A fresh random nonce is drawn for
//! every call and prepended to the ciphertext.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_DERIVATION_ROUNDS: u32 = 100_000;
pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key, wiped on drop.
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<[u8; KEY_LEN]>);

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl SymmetricKey {
    /// Derives a key from arbitrary key material.
    pub fn derive(material: &[u8]) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha256>(material, b"", KEY_DERIVATION_ROUNDS, key.as_mut_slice());
        Self(key)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.0.as_slice()))
    }

    /// Returns `nonce || ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Opens the output of [`SymmetricKey::encrypt`]. Empty input stands
    /// for a record without content and opens to empty output.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated(data.len()));
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Length of the ciphertext produced for `plaintext_len` bytes.
pub fn sealed_len(plaintext_len: usize) -> usize {
    NONCE_LEN + plaintext_len + TAG_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = SymmetricKey::derive(b"signature bytes");
        let b = SymmetricKey::derive(b"signature bytes");
        let sealed = a.encrypt(b"hello").unwrap();
        assert_eq!(b.decrypt(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn nonces_are_fresh() {
        let key = SymmetricKey::derive(b"");
        let one = key.encrypt(b"same input").unwrap();
        let two = key.encrypt(b"same input").unwrap();
        assert_ne!(one, two);
        assert_ne!(one[..NONCE_LEN], two[..NONCE_LEN]);
        assert_eq!(one.len(), sealed_len(10));
        assert_eq!(key.decrypt(&one).unwrap(), key.decrypt(&two).unwrap());
    }

    #[test]
    fn wrong_key_and_tampering_fail() {
        let key = SymmetricKey::derive(b"a");
        let other = SymmetricKey::derive(b"b");
        let mut sealed = key.encrypt(b"payload").unwrap();
        assert_eq!(other.decrypt(&sealed), Err(CryptoError::DecryptionFailed));

        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert_eq!(key.decrypt(&sealed), Err(CryptoError::DecryptionFailed));
        assert_eq!(key.decrypt(&sealed[..10]), Err(CryptoError::Truncated(10)));
    }

    #[test]
    fn empty_round_trips() {
        let key = SymmetricKey::derive(b"k");
        assert!(key.decrypt(&[]).unwrap().is_empty());
        let sealed = key.encrypt(&[]).unwrap();
        assert_eq!(sealed.len(), sealed_len(0));
        assert!(key.decrypt(&sealed).unwrap().is_empty());
    }

    #[test]
    fn debug_hides_key() {
        assert_eq!(format!("{:?}", SymmetricKey::derive(b"k")), "SymmetricKey(..)");
    }
}
