//! Encryption Facade: wallet-derived keys for names and content.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use sd_core::{Pubkey, Signature};
use serde::{Deserialize, Serialize};

use crate::{
    api::DriveApi,
    crypto::SymmetricKey,
    error::{ClientResult, CryptoError},
    session::{MemorySessionStore, SessionStore, session_key},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// How long an unlock survives; `None` keeps it for the process
    /// lifetime.
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,
}

impl EncryptionConfig {
    pub fn session_store(&self) -> MemorySessionStore {
        match self.session_ttl_secs {
            Some(secs) => MemorySessionStore::with_ttl(Duration::from_secs(secs)),
            None => MemorySessionStore::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

#[derive(Debug)]
struct Keys {
    /// Derived from the owner's challenge signature.
    private: SymmetricKey,
    /// Derived from empty input; anyone can compute it.
    public: SymmetricKey,
}

/// Encrypts and decrypts payloads of one owner.
///
/// Starts locked. Unlocking derives the private key from the owner's
/// signature over the program's challenge instruction and remembers that
/// signature in the session store.
#[derive(Debug)]
pub struct Encryption {
    owner: Pubkey,
    session: Arc<dyn SessionStore>,
    keys: RwLock<Option<Arc<Keys>>>,
}

impl Encryption {
    pub fn new(owner: Pubkey, session: Arc<dyn SessionStore>) -> Self {
        Self {
            owner,
            session,
            keys: RwLock::new(None),
        }
    }

    pub fn from_config(owner: Pubkey, config: &EncryptionConfig) -> Self {
        Self::new(owner, Arc::new(config.session_store()))
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn state(&self) -> LockState {
        match self.current() {
            Some(_) => LockState::Unlocked,
            None => LockState::Locked,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == LockState::Unlocked
    }

    fn current(&self) -> Option<Arc<Keys>> {
        self.keys
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn install(&self, signature: &Signature) {
        let keys = Keys {
            private: SymmetricKey::derive(signature.as_ref()),
            public: SymmetricKey::derive(&[]),
        };
        *self
            .keys
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(keys));
    }

    /// Unlocks with the signature remembered for this session, asking the
    /// wallet for a new one only when there is none.
    pub async fn unlock<A: DriveApi + ?Sized>(&self, api: &A) -> ClientResult<()> {
        if self.unlock_from_session()? {
            return Ok(());
        }
        let signature = api.sign_challenge().await?;
        self.unlock_with_signature(&signature);
        Ok(())
    }

    /// Unlocks from the session store without prompting the wallet.
    /// Returns whether a remembered signature was found.
    pub fn unlock_from_session(&self) -> ClientResult<bool> {
        let Some(stored) = self.session.get(&session_key(&self.owner)) else {
            return Ok(false);
        };
        let signature: Signature = stored.parse().map_err(|_| CryptoError::InvalidSession)?;
        self.install(&signature);
        tracing::debug!(owner = %self.owner.fmt_short(), "encryption restored from session");
        Ok(true)
    }

    /// Derives keys from `signature` and remembers it for the session.
    pub fn unlock_with_signature(&self, signature: &Signature) {
        self.session
            .put(&session_key(&self.owner), signature.to_string());
        self.install(signature);
        tracing::info!(owner = %self.owner.fmt_short(), "encryption unlocked");
    }

    /// Forgets the keys and the session entry.
    pub fn lock(&self) {
        self.session.remove(&session_key(&self.owner));
        *self
            .keys
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        tracing::info!(owner = %self.owner.fmt_short(), "encryption locked");
    }

    fn key(&self, use_private: bool) -> Result<SymmetricKey, CryptoError> {
        let keys = self.current().ok_or(CryptoError::KeyNotLoaded)?;
        Ok(if use_private {
            keys.private.clone()
        } else {
            keys.public.clone()
        })
    }

    pub fn encrypt(&self, plaintext: &[u8], use_private: bool) -> Result<Vec<u8>, CryptoError> {
        self.key(use_private)?.encrypt(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8], use_private: bool) -> Result<Vec<u8>, CryptoError> {
        self.key(use_private)?.decrypt(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{Keypair, Signer};

    fn encryption() -> (Keypair, Encryption) {
        let keypair = Keypair::generate();
        let encryption = Encryption::from_config(keypair.pubkey(), &EncryptionConfig::default());
        (keypair, encryption)
    }

    #[test]
    fn locked_until_unlocked() {
        let (keypair, encryption) = encryption();
        assert_eq!(encryption.state(), LockState::Locked);
        assert_eq!(encryption.encrypt(b"x", true), Err(CryptoError::KeyNotLoaded));
        assert_eq!(encryption.decrypt(b"x", false), Err(CryptoError::KeyNotLoaded));

        let signature = keypair.try_sign_message(b"challenge").unwrap();
        encryption.unlock_with_signature(&signature);
        assert!(encryption.is_unlocked());

        encryption.lock();
        assert_eq!(encryption.state(), LockState::Locked);
        assert!(!encryption.unlock_from_session().unwrap());
    }

    #[test]
    fn keys_separate_private_and_public() {
        let (keypair, encryption) = encryption();
        let signature = keypair.try_sign_message(b"challenge").unwrap();
        encryption.unlock_with_signature(&signature);

        let private = encryption.encrypt(b"secret.txt", true).unwrap();
        assert_eq!(encryption.decrypt(&private, true).unwrap(), b"secret.txt");
        let public = encryption.encrypt(b"secret.txt", false).unwrap();
        assert_eq!(encryption.decrypt(&public, false).unwrap(), b"secret.txt");
        assert_eq!(
            encryption.decrypt(&public, true),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn session_restores_the_same_keys() {
        let keypair = Keypair::generate();
        let session: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let first = Encryption::new(keypair.pubkey(), session.clone());
        let signature = keypair.try_sign_message(b"challenge").unwrap();
        first.unlock_with_signature(&signature);
        let sealed = first.encrypt(b"payload", true).unwrap();

        let second = Encryption::new(keypair.pubkey(), session.clone());
        assert!(second.unlock_from_session().unwrap());
        assert_eq!(second.decrypt(&sealed, true).unwrap(), b"payload");
        assert_eq!(
            session.get(&session_key(&keypair.pubkey())),
            Some(signature.to_string())
        );
    }

    #[test]
    fn corrupt_session_values_are_reported() {
        let keypair = Keypair::generate();
        let session: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        session.put(&session_key(&keypair.pubkey()), "not base58!".into());
        let encryption = Encryption::new(keypair.pubkey(), session);
        assert!(encryption.unlock_from_session().is_err());
        assert!(!encryption.is_unlocked());
    }
}
