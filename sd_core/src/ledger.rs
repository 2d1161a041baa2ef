use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::LedgerError,
    pubkey::{Blockhash, Pubkey, Signature},
    transaction::Transaction,
};

pub type LedgerResult<T, E = LedgerError> = std::result::Result<T, E>;

/// Lamports per byte-year charged for account storage.
pub const LAMPORTS_PER_BYTE_YEAR: u64 = 3480;

/// Years of rent an account must prepay to be exempt.
pub const EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// Bytes of bookkeeping charged on top of every account's data.
pub const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Rent-exempt minimum balance for an account holding `data_len` bytes.
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (ACCOUNT_STORAGE_OVERHEAD + data_len as u64) * LAMPORTS_PER_BYTE_YEAR * EXEMPTION_THRESHOLD_YEARS
}

/// A raw ledger account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub lamports: u64,
    /// Program that owns the account.
    pub owner: Pubkey,
    pub data: Bytes,
}

/// Server-side filter applied to program account scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Matches accounts whose data contains `bytes` at `offset`.
    Memcmp { offset: usize, bytes: Vec<u8> },
    /// Matches accounts whose data is exactly this long.
    DataSize(u64),
}

impl AccountFilter {
    pub fn memcmp(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        AccountFilter::Memcmp {
            offset,
            bytes: bytes.into(),
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset + bytes.len())
                .is_some_and(|window| window == bytes.as_slice()),
            AccountFilter::DataSize(len) => data.len() as u64 == *len,
        }
    }
}

/// Access to the ledger: account reads, program scans and transaction
/// submission.
///
/// `send_transaction` returns once the transaction is confirmed; a
/// transaction either applies all of its instructions or none of them.
#[async_trait]
pub trait Ledger: std::fmt::Debug + Send + Sync + 'static {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>>;

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> LedgerResult<Vec<(Pubkey, Account)>>;

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash>;

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64>;

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64>;

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> LedgerResult<Signature>;
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        (**self).get_account(address).await
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> LedgerResult<Vec<(Pubkey, Account)>> {
        (**self).get_program_accounts(program_id, filters).await
    }

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        (**self).latest_blockhash().await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        (**self).send_transaction(transaction).await
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        (**self).minimum_balance_for_rent_exemption(data_len).await
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        (**self).get_balance(address).await
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        (**self).request_airdrop(address, lamports).await
    }
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Box<T> {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        (**self).get_account(address).await
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> LedgerResult<Vec<(Pubkey, Account)>> {
        (**self).get_program_accounts(program_id, filters).await
    }

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        (**self).latest_blockhash().await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        (**self).send_transaction(transaction).await
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        (**self).minimum_balance_for_rent_exemption(data_len).await
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        (**self).get_balance(address).await
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        (**self).request_airdrop(address, lamports).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_matches_cluster_defaults() {
        assert_eq!(rent_exempt_minimum(0), 890_880);
        assert_eq!(rent_exempt_minimum(85), (128 + 85) * 6960);
    }

    #[test]
    fn memcmp_filter() {
        let data = [0u8, 1, 2, 3, 4, 5];
        assert!(AccountFilter::memcmp(2, vec![2, 3]).matches(&data));
        assert!(!AccountFilter::memcmp(2, vec![3]).matches(&data));
        assert!(!AccountFilter::memcmp(5, vec![5, 6]).matches(&data));
        assert!(AccountFilter::DataSize(6).matches(&data));
    }
}
