//! An in-process ledger running the Soldrive program.
//!
//! `MemoryLedger` keeps accounts in memory and executes submitted
//! transactions with the same rules as the deployed program: signatures,
//! blockhashes, packet size, seed constraints, rent and the program's own
//! argument checks. The instructions of one transaction run against a
//! scratch copy of the accounts that is committed only when all of them
//! succeed.

mod program;

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use rand::RngCore;
use sd_core::{
    Account, AccountFilter, Blockhash, Ledger, LedgerError, LedgerResult, Pubkey,
    SOLDRIVE_PROGRAM_ID, Signature, Transaction, ledger::rent_exempt_minimum,
    pubkey::system_program,
};

use crate::program::{AccountMap, Program};

/// Lamports charged per transaction signature.
pub const FEE_PER_SIGNATURE: u64 = 5000;

/// Number of recently issued blockhashes a transaction may reference.
pub const MAX_RECENT_BLOCKHASHES: usize = 150;

#[derive(Debug, Default)]
struct State {
    accounts: AccountMap,
    blockhashes: VecDeque<Blockhash>,
    fail_next_at: Option<usize>,
    submitted: usize,
}

#[derive(Debug)]
pub struct MemoryLedger {
    program: Program,
    state: Mutex<State>,
}

impl MemoryLedger {
    /// Creates an empty ledger with the program at its default address.
    pub fn new() -> Self {
        Self::with_program_id(SOLDRIVE_PROGRAM_ID)
    }

    pub fn with_program_id(program_id: Pubkey) -> Self {
        Self {
            program: Program { id: program_id },
            state: Mutex::new(State::default()),
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program.id
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credits `lamports` to `address` without a transaction.
    pub fn airdrop(&self, address: &Pubkey, lamports: u64) {
        let mut state = self.state();
        let account = state.accounts.entry(*address).or_insert_with(|| Account {
            owner: system_program::ID,
            ..Default::default()
        });
        account.lamports += lamports;
        tracing::info!(address = %address.fmt_short(), lamports, "airdrop");
    }

    /// Makes the next submitted transaction fail when it reaches the
    /// instruction at `index`.
    pub fn fail_next_at(&self, index: usize) {
        self.state().fail_next_at = Some(index);
    }

    /// Number of transactions that were applied.
    pub fn submitted_transactions(&self) -> usize {
        self.state().submitted
    }

    fn random_signature() -> Signature {
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut bytes);
        Signature::new_from_array(bytes)
    }

    fn process(&self, tx: &Transaction) -> LedgerResult<Signature> {
        tx.serialize()
            .map_err(|e| LedgerError::rejected(e.to_string()))?;
        tx.verify()
            .map_err(|e| LedgerError::rejected(format!("Transaction signature verification failure: {e}")))?;
        let signature = *tx.signature().ok_or_else(|| LedgerError::rejected("unsigned transaction"))?;
        let payer = *tx
            .message
            .fee_payer()
            .ok_or_else(|| LedgerError::rejected("transaction has no fee payer"))?;
        let instructions = tx.message.decompile()?;
        let now = chrono::Utc::now().timestamp();

        let mut state = self.state();
        let fail_at = state.fail_next_at.take();
        if !state.blockhashes.contains(&tx.message.recent_blockhash) {
            return Err(LedgerError::rejected("Blockhash not found"));
        }

        let mut scratch = state.accounts.clone();
        let fee = FEE_PER_SIGNATURE * tx.signatures.len() as u64;
        match scratch.get_mut(&payer) {
            Some(account) if account.lamports >= fee => account.lamports -= fee,
            _ => {
                return Err(LedgerError::rejected(
                    "Attempt to debit an account but found no record of a prior credit.",
                ));
            }
        }

        for (index, ix) in instructions.iter().enumerate() {
            if fail_at == Some(index) {
                tracing::debug!(index, "injected failure");
                return Err(LedgerError::rejected(format!(
                    "Error processing Instruction {index}: injected failure"
                )));
            }
            self.program
                .execute(&mut scratch, ix, now)
                .inspect_err(|e| tracing::debug!(index, error = %e, "instruction failed"))?;
        }

        state.accounts = scratch;
        state.submitted += 1;
        tracing::debug!(%signature, instructions = instructions.len(), "transaction applied");
        Ok(signature)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        Ok(self.state().accounts.get(address).cloned())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> LedgerResult<Vec<(Pubkey, Account)>> {
        let state = self.state();
        let mut found: Vec<(Pubkey, Account)> = state
            .accounts
            .iter()
            .filter(|(_, account)| account.owner == *program_id)
            .filter(|(_, account)| filters.iter().all(|f| f.matches(&account.data)))
            .map(|(address, account)| (*address, account.clone()))
            .collect();
        found.sort_by_key(|(address, _)| *address);
        Ok(found)
    }

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let blockhash = Blockhash::new_from_array(bytes);
        let mut state = self.state();
        if state.blockhashes.len() == MAX_RECENT_BLOCKHASHES {
            state.blockhashes.pop_front();
        }
        state.blockhashes.push_back(blockhash);
        Ok(blockhash)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        self.process(transaction)
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        Ok(rent_exempt_minimum(data_len))
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        Ok(self
            .state()
            .accounts
            .get(address)
            .map(|a| a.lamports)
            .unwrap_or_default())
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        self.airdrop(address, lamports);
        Ok(Self::random_signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{
        InstructionBuilder, Keypair, ProgramError, Signer,
        testutil::{LedgerTests, TestWallet, new_file},
        wire,
    };

    #[tokio::test]
    async fn test_memory_ledger() {
        let ledger = MemoryLedger::new();
        LedgerTests::new(&ledger).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn injected_failure_rolls_back_the_whole_group() {
        let ledger = MemoryLedger::new();
        let wallet = TestWallet::funded(&ledger, ledger.program_id()).await.unwrap();
        wallet.create_user().await.unwrap();
        let id = wallet.create_file(new_file(0, b"old", 3)).await.unwrap();
        let applied = ledger.submitted_transactions();

        ledger.fail_next_at(1);
        let result = wallet
            .send(&[
                wallet.builder.remove_file(id).unwrap(),
                wallet.builder.create_file(id + 1, new_file(0, b"new!", 4)).unwrap(),
            ])
            .await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));
        assert_eq!(ledger.submitted_transactions(), applied);
        assert!(wallet.file(id).await.unwrap().is_some());
        assert!(wallet.file(id + 1).await.unwrap().is_none());

        // the hook only applies once
        wallet
            .send(&[
                wallet.builder.remove_file(id).unwrap(),
                wallet.builder.create_file(id + 1, new_file(0, b"new!", 4)).unwrap(),
            ])
            .await
            .unwrap();
        assert!(wallet.file(id).await.unwrap().is_none());
        assert_eq!(
            wallet.file(id + 1).await.unwrap().unwrap().content.as_deref(),
            Some(&b"new!"[..])
        );
    }

    #[tokio::test]
    async fn exhausted_file_counter_is_a_program_error() {
        let ledger = MemoryLedger::new();
        let wallet = TestWallet::funded(&ledger, ledger.program_id()).await.unwrap();
        wallet.create_user().await.unwrap();
        let user_address = wallet.builder.deriver().user().unwrap();
        {
            let mut state = ledger.state();
            let account = state.accounts.get_mut(&user_address).unwrap();
            let mut user = wire::decode_user(&account.data).unwrap();
            user.file_id = u32::MAX;
            account.data = wire::encode_user(&user).into();
        }

        let err = wallet
            .send(&[wallet.builder.create_file(0, new_file(0, b"x", 1)).unwrap()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Program(ProgramError::FileCountExceeded)
        ));

        let err = wallet.create_file(new_file(0, b"x", 1)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProgramError>(),
            Some(&ProgramError::FileCountExceeded)
        );
    }

    #[tokio::test]
    async fn foreign_seeds_are_rejected() {
        let ledger = MemoryLedger::new();
        let alice = TestWallet::funded(&ledger, ledger.program_id()).await.unwrap();
        alice.create_user().await.unwrap();
        let id = alice.create_file(new_file(0, b"mine", 4)).await.unwrap();

        // bob signs for alice's file address
        let bob = Keypair::generate();
        ledger.airdrop(&bob.pubkey(), 1_000_000_000);
        let mut ix = InstructionBuilder::new(ledger.program_id(), bob.pubkey())
            .remove_file(id)
            .unwrap();
        ix.accounts[0].pubkey = alice.builder.deriver().file(id).unwrap();
        let blockhash = ledger.latest_blockhash().await.unwrap();
        let tx = Transaction::new_signed(&[ix], &bob, &[], blockhash).unwrap();
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("ConstraintSeeds"), "{err}");
    }

    #[tokio::test]
    async fn stale_blockhash_and_bad_signature_are_rejected() {
        let ledger = MemoryLedger::new();
        let wallet = TestWallet::funded(&ledger, ledger.program_id()).await.unwrap();
        let ix = wallet.builder.create_user().unwrap();

        let tx = Transaction::new_signed(&[ix.clone()], &wallet.keypair, &[], Blockhash::ZERO)
            .unwrap();
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("Blockhash not found"));

        let blockhash = ledger.latest_blockhash().await.unwrap();
        let mut tx = Transaction::new_signed(&[ix], &wallet.keypair, &[], blockhash).unwrap();
        tx.signatures[0] = Signature::default();
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("signature verification"));
        assert_eq!(ledger.submitted_transactions(), 0);
    }

    #[tokio::test]
    async fn expired_blockhashes_are_rejected() {
        let ledger = MemoryLedger::new();
        let wallet = TestWallet::funded(&ledger, ledger.program_id()).await.unwrap();
        let ix = wallet.builder.create_user().unwrap();

        let oldest = ledger.latest_blockhash().await.unwrap();
        for _ in 0..MAX_RECENT_BLOCKHASHES {
            ledger.latest_blockhash().await.unwrap();
        }
        assert_eq!(ledger.state().blockhashes.len(), MAX_RECENT_BLOCKHASHES);

        let tx = Transaction::new_signed(&[ix.clone()], &wallet.keypair, &[], oldest).unwrap();
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("Blockhash not found"));

        let recent = ledger.latest_blockhash().await.unwrap();
        let tx = Transaction::new_signed(&[ix], &wallet.keypair, &[], recent).unwrap();
        ledger.send_transaction(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn unfunded_payer_cannot_create_accounts() {
        let ledger = MemoryLedger::new();
        let keypair = Keypair::generate();
        ledger.airdrop(&keypair.pubkey(), FEE_PER_SIGNATURE);
        let builder = InstructionBuilder::new(ledger.program_id(), keypair.pubkey());
        let blockhash = ledger.latest_blockhash().await.unwrap();
        let tx = Transaction::new_signed(&[builder.create_user().unwrap()], &keypair, &[], blockhash)
            .unwrap();
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("insufficient lamports"));
        assert_eq!(
            ledger.get_balance(&keypair.pubkey()).await.unwrap(),
            FEE_PER_SIGNATURE,
            "failed transactions leave balances untouched"
        );
    }

    #[tokio::test]
    async fn removing_a_file_refunds_rent() {
        let ledger = MemoryLedger::new();
        let wallet = TestWallet::funded(&ledger, ledger.program_id()).await.unwrap();
        wallet.create_user().await.unwrap();
        let before = ledger.get_balance(&wallet.keypair.pubkey()).await.unwrap();
        let id = wallet.create_file(new_file(0, b"abc", 100)).await.unwrap();
        wallet
            .send(&[wallet.builder.remove_file(id).unwrap()])
            .await
            .unwrap();
        let after = ledger.get_balance(&wallet.keypair.pubkey()).await.unwrap();
        assert_eq!(before - after, 2 * FEE_PER_SIGNATURE);
    }
}
