use thiserror::Error;

use crate::{
    address::AddressError, pubkey::Pubkey, transaction::TransactionError, wire::DecodeError,
};

/// First custom error code of the Soldrive program.
pub const PROGRAM_ERROR_BASE: u32 = 6000;

/// Errors raised by the Soldrive program itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("String too long")]
    StringTooLong,
    #[error("Folder count exceeded")]
    FolderCountExceeded,
    #[error("File count exceeded")]
    FileCountExceeded,
    #[error("Data size exceeded")]
    DataSizeExceeded,
}

impl ProgramError {
    pub fn code(&self) -> u32 {
        PROGRAM_ERROR_BASE
            + match self {
                ProgramError::StringTooLong => 0,
                ProgramError::FolderCountExceeded => 1,
                ProgramError::FileCountExceeded => 2,
                ProgramError::DataSizeExceeded => 3,
            }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code.checked_sub(PROGRAM_ERROR_BASE)? {
            0 => Some(ProgramError::StringTooLong),
            1 => Some(ProgramError::FolderCountExceeded),
            2 => Some(ProgramError::FileCountExceeded),
            3 => Some(ProgramError::DataSizeExceeded),
            _ => None,
        }
    }
}

/// Failures of ledger reads and submissions.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The stable not-found message; callers match on its prefix.
    #[error("Account does not exist or has no data {0}")]
    AccountNotFound(Pubkey),
    #[error("custom program error {}: {}", .0.code(), .0)]
    Program(#[from] ProgramError),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("malformed account data: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::AccountNotFound(_))
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        LedgerError::Rejected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_codes() {
        for err in [
            ProgramError::StringTooLong,
            ProgramError::FolderCountExceeded,
            ProgramError::FileCountExceeded,
            ProgramError::DataSizeExceeded,
        ] {
            assert_eq!(ProgramError::from_code(err.code()), Some(err));
        }
        assert_eq!(ProgramError::DataSizeExceeded.code(), 6003);
        assert_eq!(ProgramError::from_code(42), None);
        assert_eq!(ProgramError::from_code(6004), None);
    }

    #[test]
    fn not_found_message_is_matchable() {
        let err = LedgerError::AccountNotFound(Pubkey::default());
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("Account does not exist"));
        assert!(!LedgerError::rejected("insufficient funds").is_not_found());
        assert_eq!(
            LedgerError::from(ProgramError::StringTooLong).to_string(),
            "custom program error 6000: String too long"
        );
    }
}
