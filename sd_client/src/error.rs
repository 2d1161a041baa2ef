use std::string::FromUtf8Error;

use sd_core::{AddressError, LedgerError, OffloadError, SignerError};
use thiserror::Error;

/// Failures of the Encryption Facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("The encryption key not loaded")]
    KeyNotLoaded,
    #[error("decryption failed: ciphertext did not authenticate")]
    DecryptionFailed,
    #[error("ciphertext of {0} bytes is shorter than its nonce")]
    Truncated(usize),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("session value is not a valid signature")]
    InvalidSession,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Offload(#[from] OffloadError),
    #[error("decrypted name is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("wallet refused to sign: {0}")]
    Signer(#[from] SignerError),
    #[error("content is stored externally but no content store is configured")]
    OffloadUnavailable,
    #[error("malformed external content link")]
    InvalidLink,
}

impl From<AddressError> for ClientError {
    fn from(error: AddressError) -> Self {
        ClientError::Ledger(error.into())
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested account or payload does not exist.
    NotFound,
    /// Encryption was used before it was unlocked.
    KeyNotReady,
    /// The ledger or storage network refused a submission.
    SubmissionRejected,
    Other,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Ledger(LedgerError::AccountNotFound(_))
            | ClientError::Offload(OffloadError::NotFound(_)) => ErrorKind::NotFound,
            ClientError::Crypto(CryptoError::KeyNotLoaded) => ErrorKind::KeyNotReady,
            ClientError::Ledger(
                LedgerError::Program(_) | LedgerError::Rejected(_) | LedgerError::Transaction(_),
            )
            | ClientError::Offload(
                OffloadError::InsufficientFunds { .. } | OffloadError::UploadFailed(_),
            )
            | ClientError::Signer(_) => ErrorKind::SubmissionRejected,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{ContentId, ProgramError, Pubkey};

    #[test]
    fn classifies_into_taxonomy() {
        let missing = ClientError::from(LedgerError::AccountNotFound(Pubkey::default()));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(missing.to_string().starts_with("Account does not exist"));

        let offloaded = ClientError::from(OffloadError::NotFound(ContentId::new("x")));
        assert!(offloaded.is_not_found());

        assert_eq!(
            ClientError::from(CryptoError::KeyNotLoaded).kind(),
            ErrorKind::KeyNotReady
        );
        assert_eq!(
            ClientError::from(LedgerError::from(ProgramError::StringTooLong)).kind(),
            ErrorKind::SubmissionRejected
        );
        assert_eq!(
            ClientError::from(LedgerError::rejected("Blockhash not found")).kind(),
            ErrorKind::SubmissionRejected
        );
        assert_eq!(
            ClientError::from(OffloadError::InsufficientFunds { balance: 0, cost: 1 }).kind(),
            ErrorKind::SubmissionRejected
        );
        assert_eq!(ClientError::InvalidLink.kind(), ErrorKind::Other);
    }

    #[test]
    fn submission_messages_pass_through() {
        let err = ClientError::from(LedgerError::rejected("Transfer: insufficient lamports"));
        assert!(err.to_string().contains("Transfer: insufficient lamports"));
    }
}
