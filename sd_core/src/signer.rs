//! Wallet signing abstraction.
//!
//! Every mutation of a Soldrive account is authorised by a signature of the
//! owning wallet. A browser wallet, a hardware device and a local keypair file
//! all fit behind [`Signer`]; this crate ships the local keypair.

use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::pubkey::{Pubkey, Signature};

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid secret key: expected 32 or 64 bytes, got {0}")]
    InvalidSecretKey(usize),
    #[error("keypair halves do not match")]
    MismatchedKeypair,
    #[error("wallet refused to sign: {0}")]
    Refused(String),
}

/// Anything that can produce signatures for a single wallet identity.
pub trait Signer: Send + Sync {
    /// The identity whose records this signer controls.
    fn pubkey(&self) -> Pubkey;

    /// Signs a serialized transaction message.
    fn try_sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

impl<T: Signer + ?Sized> Signer for std::sync::Arc<T> {
    fn pubkey(&self) -> Pubkey {
        (**self).pubkey()
    }

    fn try_sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        (**self).try_sign_message(message)
    }
}

/// An ed25519 keypair held in process memory.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

impl Keypair {
    /// Generates a fresh keypair from the operating system's RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Builds a keypair from raw secret bytes.
    ///
    /// Accepts either the 32-byte seed or the 64-byte `seed || pubkey` form
    /// written by common wallet tooling; in the latter case the public half
    /// must match the seed.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                Ok(Self {
                    signing_key: SigningKey::from_bytes(&seed),
                })
            }
            64 => {
                let keypair = Self::from_secret_bytes(&bytes[..32])?;
                if keypair.pubkey().as_bytes() != &bytes[32..] {
                    return Err(SignerError::MismatchedKeypair);
                }
                Ok(keypair)
            }
            other => Err(SignerError::InvalidSecretKey(other)),
        }
    }

    /// The 32-byte secret seed.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Signer for Keypair {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    fn try_sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        let signature = self.signing_key.sign(message);
        Ok(Signature::new_from_array(signature.to_bytes()))
    }
}
