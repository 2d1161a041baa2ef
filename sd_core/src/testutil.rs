//! Test utilities for `Ledger` implementations.
//!
//! `LedgerTests` drives the Soldrive program through any `Ledger` and checks
//! the resulting account state, so the in-memory ledger and a local validator
//! can be held to the same contract.
//!
//! # Usage
//!
//! In your ledger crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! sd_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use sd_core::testutil::LedgerTests;
//!
//! #[tokio::test]
//! async fn test_my_ledger() {
//!     let ledger = MyLedger::new(...);
//!     LedgerTests::new(&ledger).run_all().await.unwrap();
//! }
//! ```

use anyhow::{Context, ensure};
use bytes::Bytes;
use rand::RngCore;

use crate::{
    error::{LedgerError, ProgramError},
    instruction::{FileUpdate, FolderUpdate, Instruction, InstructionBuilder, NewFile},
    ledger::{AccountFilter, LAMPORTS_PER_SOL, Ledger},
    pubkey::{Pubkey, SOLDRIVE_PROGRAM_ID, Signature},
    record::{Access, Backend, File, User},
    signer::{Keypair, Signer},
    transaction::Transaction,
    wire,
};

/// Random payload of `len` bytes.
pub fn random_bytes(len: usize) -> Bytes {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    Bytes::from(buf)
}

/// A file creation with plain test values.
pub fn new_file(parent: u32, content: &[u8], max_size: u32) -> NewFile {
    NewFile {
        max_size,
        parent,
        name: b"file".to_vec(),
        file_ext: "txt".into(),
        file_size: content.len() as u64,
        access: Access::Private,
        backend: Backend::Solana,
        content: Bytes::copy_from_slice(content),
    }
}

/// One funded wallet acting against the ledger under test.
pub struct TestWallet<'a, L> {
    ledger: &'a L,
    pub keypair: Keypair,
    pub builder: InstructionBuilder,
}

impl<'a, L: Ledger> TestWallet<'a, L> {
    /// Creates a wallet and funds it through an airdrop.
    pub async fn funded(ledger: &'a L, program_id: Pubkey) -> anyhow::Result<Self> {
        let keypair = Keypair::generate();
        ledger
            .request_airdrop(&keypair.pubkey(), LAMPORTS_PER_SOL)
            .await
            .context("airdrop")?;
        let builder = InstructionBuilder::new(program_id, keypair.pubkey());
        Ok(Self {
            ledger,
            keypair,
            builder,
        })
    }

    pub async fn send(&self, instructions: &[Instruction]) -> Result<Signature, LedgerError> {
        let blockhash = self.ledger.latest_blockhash().await?;
        let tx = Transaction::new_signed(instructions, &self.keypair, &[], blockhash)?;
        self.ledger.send_transaction(&tx).await
    }

    pub async fn user(&self) -> anyhow::Result<User> {
        let address = self.builder.deriver().user()?;
        let account = self
            .ledger
            .get_account(&address)
            .await?
            .context("user account missing")?;
        Ok(wire::decode_user(&account.data)?)
    }

    pub async fn file(&self, id: u32) -> anyhow::Result<Option<File>> {
        let address = self.builder.deriver().file(id)?;
        match self.ledger.get_account(&address).await? {
            Some(account) => Ok(Some(wire::decode_file(&account.data, true)?)),
            None => Ok(None),
        }
    }

    pub async fn create_user(&self) -> anyhow::Result<()> {
        self.send(&[self.builder.create_user()?]).await?;
        Ok(())
    }

    pub async fn create_folder(&self, parent: u32, name: &[u8]) -> anyhow::Result<u32> {
        let id = self.user().await?.next_folder_id()?;
        self.send(&[self.builder.create_folder(id, parent, name.to_vec())?])
            .await?;
        Ok(id)
    }

    pub async fn create_file(&self, file: NewFile) -> anyhow::Result<u32> {
        let id = self.user().await?.next_file_id()?;
        self.send(&[self.builder.create_file(id, file)?]).await?;
        Ok(id)
    }
}

/// Test suite for ledgers that execute the Soldrive program.
pub struct LedgerTests<'a, L> {
    ledger: &'a L,
    program_id: Pubkey,
}

impl<'a, L: Ledger> LedgerTests<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self {
            ledger,
            program_id: SOLDRIVE_PROGRAM_ID,
        }
    }

    /// Runs against a program deployed at a different address.
    pub fn with_program_id(ledger: &'a L, program_id: Pubkey) -> Self {
        Self { ledger, program_id }
    }

    async fn wallet(&self) -> anyhow::Result<TestWallet<'a, L>> {
        TestWallet::funded(self.ledger, self.program_id).await
    }

    /// Run all tests.
    pub async fn run_all(&self) -> anyhow::Result<()> {
        self.test_create_user().await?;
        self.test_folder_lifecycle().await?;
        self.test_file_lifecycle().await?;
        self.test_capacity_is_enforced().await?;
        self.test_name_length_is_enforced().await?;
        self.test_scans_filter_by_owner_and_parent().await?;
        self.test_group_is_all_or_nothing().await?;
        self.test_rent_is_charged().await?;
        Ok(())
    }

    pub async fn test_create_user(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        let address = wallet.builder.deriver().user()?;
        ensure!(
            self.ledger.get_account(&address).await?.is_none(),
            "user should not exist before creation"
        );

        wallet.create_user().await?;
        let user = wallet.user().await?;
        assert_eq!(user.folder_id, 0);
        assert_eq!(user.file_id, 0);
        assert_eq!(user.space_used, 0);
        assert!(user.encryption, "new users have encryption enabled");

        let again = wallet.send(&[wallet.builder.create_user()?]).await;
        assert!(again.is_err(), "a user can only be created once");
        Ok(())
    }

    pub async fn test_folder_lifecycle(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        wallet.create_user().await?;

        let docs = wallet.create_folder(0, b"docs").await?;
        let notes = wallet.create_folder(docs, b"notes").await?;
        assert_eq!((docs, notes), (1, 2), "folder ids start at 1");

        wallet
            .send(&[wallet.builder.update_folder(
                notes,
                FolderUpdate {
                    parent: Some(0),
                    name: Some(b"archive".to_vec()),
                },
            )?])
            .await?;
        let address = wallet.builder.deriver().folder(notes)?;
        let account = self
            .ledger
            .get_account(&address)
            .await?
            .context("folder missing")?;
        let folder = wire::decode_folder(&account.data)?;
        assert_eq!(folder.parent, 0);
        assert_eq!(folder.name, b"archive");
        assert_eq!(folder.owner, wallet.keypair.pubkey());

        wallet
            .send(&[wallet.builder.remove_folder(docs)?])
            .await?;
        let docs_address = wallet.builder.deriver().folder(docs)?;
        ensure!(
            self.ledger.get_account(&docs_address).await?.is_none(),
            "removed folder should be gone"
        );
        let user = wallet.user().await?;
        assert_eq!(user.folder_count, 1);
        assert_eq!(user.folder_id, 2, "ids are never reused");
        Ok(())
    }

    pub async fn test_file_lifecycle(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        wallet.create_user().await?;

        let id = wallet.create_file(new_file(0, b"hello world", 24)).await?;
        let file = wallet.file(id).await?.context("file missing")?;
        assert_eq!(file.size, 11);
        assert_eq!(file.max_size, 24);
        assert_eq!(file.content.as_deref(), Some(&b"hello world"[..]));
        assert_eq!(wallet.user().await?.space_used, 24);

        wallet
            .send(&[wallet.builder.update_file(
                id,
                FileUpdate {
                    content: Some(Bytes::from_static(b"short")),
                    access: Some(Access::PublicRead),
                    ..Default::default()
                },
            )?])
            .await?;
        let file = wallet.file(id).await?.context("file missing")?;
        assert_eq!(file.content.as_deref(), Some(&b"short"[..]));
        assert_eq!(file.access, Access::PublicRead);
        assert_eq!(file.max_size, 24, "capacity never changes");

        wallet.send(&[wallet.builder.remove_file(id)?]).await?;
        ensure!(wallet.file(id).await?.is_none(), "removed file should be gone");
        let user = wallet.user().await?;
        assert_eq!(user.file_count, 0);
        assert_eq!(user.space_used, 0);
        Ok(())
    }

    pub async fn test_capacity_is_enforced(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        wallet.create_user().await?;
        let id = wallet.create_file(new_file(0, b"", 4)).await?;

        let exact = FileUpdate {
            content: Some(Bytes::from_static(b"1234")),
            ..Default::default()
        };
        wallet.send(&[wallet.builder.update_file(id, exact)?]).await?;

        let over = FileUpdate {
            content: Some(Bytes::from_static(b"12345")),
            ..Default::default()
        };
        let result = wallet.send(&[wallet.builder.update_file(id, over)?]).await;
        assert!(
            matches!(
                result,
                Err(LedgerError::Program(ProgramError::DataSizeExceeded))
            ),
            "content larger than capacity must fail, got {result:?}"
        );
        let file = wallet.file(id).await?.context("file missing")?;
        assert_eq!(file.content.as_deref(), Some(&b"1234"[..]));
        Ok(())
    }

    pub async fn test_name_length_is_enforced(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        wallet.create_user().await?;
        let name = vec![b'a'; wire::NAME_MAX_LEN + 1];
        let result = wallet
            .send(&[wallet.builder.create_folder(1, 0, name)?])
            .await;
        assert!(
            matches!(result, Err(LedgerError::Program(ProgramError::StringTooLong))),
            "long names must fail, got {result:?}"
        );
        let mut file = new_file(0, b"", 0);
        file.file_ext = "jpeg2".into();
        let result = wallet.send(&[wallet.builder.create_file(1, file)?]).await;
        assert!(
            matches!(result, Err(LedgerError::Program(ProgramError::StringTooLong))),
            "long extensions must fail, got {result:?}"
        );
        assert_eq!(wallet.user().await?.file_count, 0);
        Ok(())
    }

    pub async fn test_scans_filter_by_owner_and_parent(&self) -> anyhow::Result<()> {
        let alice = self.wallet().await?;
        let bob = self.wallet().await?;
        alice.create_user().await?;
        bob.create_user().await?;

        let folder = alice.create_folder(0, b"docs").await?;
        alice.create_file(new_file(folder, b"a", 1)).await?;
        alice.create_file(new_file(0, b"b", 1)).await?;
        bob.create_file(new_file(folder, b"c", 1)).await?;

        let files_of = |owner: Pubkey| {
            vec![
                AccountFilter::memcmp(0, wire::FILE_DISCRIMINATOR.to_vec()),
                AccountFilter::memcmp(wire::OWNER_OFFSET, owner.to_bytes().to_vec()),
            ]
        };

        let alice_files = self
            .ledger
            .get_program_accounts(&self.program_id, &files_of(alice.keypair.pubkey()))
            .await?;
        assert_eq!(alice_files.len(), 2);

        let mut in_folder = files_of(alice.keypair.pubkey());
        in_folder.push(AccountFilter::memcmp(
            wire::PARENT_OFFSET,
            folder.to_le_bytes().to_vec(),
        ));
        let children = self
            .ledger
            .get_program_accounts(&self.program_id, &in_folder)
            .await?;
        assert_eq!(children.len(), 1);
        let child = wire::decode_file(&children[0].1.data, true)?;
        assert_eq!(child.content.as_deref(), Some(&b"a"[..]));
        assert_eq!(children[0].0, alice.builder.deriver().file(child.id)?);
        Ok(())
    }

    pub async fn test_group_is_all_or_nothing(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        wallet.create_user().await?;
        let id = wallet.create_file(new_file(0, b"keep me", 8)).await?;
        let before = wallet.user().await?;

        // the replacement claims less capacity than its content needs
        let broken = new_file(0, b"much longer content", 2);
        let result = wallet
            .send(&[
                wallet.builder.remove_file(id)?,
                wallet.builder.create_file(id + 1, broken)?,
            ])
            .await;
        ensure!(result.is_err(), "group with a failing instruction must fail");

        let file = wallet.file(id).await?.context("old file must survive")?;
        assert_eq!(file.content.as_deref(), Some(&b"keep me"[..]));
        ensure!(
            wallet.file(id + 1).await?.is_none(),
            "replacement must not exist"
        );
        assert_eq!(wallet.user().await?, before, "user counters must be untouched");
        Ok(())
    }

    pub async fn test_rent_is_charged(&self) -> anyhow::Result<()> {
        let wallet = self.wallet().await?;
        let owner = wallet.keypair.pubkey();
        let before = self.ledger.get_balance(&owner).await?;
        wallet.create_user().await?;
        let after = self.ledger.get_balance(&owner).await?;
        let rent = self
            .ledger
            .minimum_balance_for_rent_exemption(wire::USER_SPACE)
            .await?;
        ensure!(
            before - after >= rent,
            "creating an account must cost at least its rent ({} < {rent})",
            before - after
        );
        Ok(())
    }
}
