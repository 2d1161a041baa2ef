//! Raw Ledger Client: one program instruction per call.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use sd_core::{
    AccountFilter, Blockhash, File, FileUpdate, Folder, FolderUpdate, Instruction,
    InstructionBuilder, Keyed, Ledger, LedgerError, NewFile, Pubkey, Signature, Signer,
    Transaction, User,
    wire::{self, Discriminator},
};

use crate::{
    api::{Children, DriveApi, FileQuery},
    error::ClientResult,
};

/// Talks to the Soldrive program through a [`Ledger`], signing with the
/// owner's wallet.
pub struct LedgerClient<L> {
    ledger: L,
    signer: Arc<dyn Signer>,
    builder: InstructionBuilder,
}

impl<L: std::fmt::Debug> std::fmt::Debug for LedgerClient<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("ledger", &self.ledger)
            .field("owner", &self.builder.authority())
            .finish()
    }
}

impl<L: Ledger> LedgerClient<L> {
    pub fn new(ledger: L, signer: Arc<dyn Signer>, program_id: Pubkey) -> Self {
        let builder = InstructionBuilder::new(program_id, signer.pubkey());
        Self {
            ledger,
            signer,
            builder,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn builder(&self) -> &InstructionBuilder {
        &self.builder
    }

    fn program_id(&self) -> Pubkey {
        self.builder.deriver().program_id
    }

    /// Submits `instructions` as one atomic group.
    pub async fn send(&self, instructions: &[Instruction]) -> ClientResult<Signature> {
        let blockhash = self.ledger.latest_blockhash().await?;
        let tx = Transaction::new_signed(instructions, self.signer.as_ref(), &[], blockhash)
            .map_err(LedgerError::from)?;
        let signature = self.ledger.send_transaction(&tx).await?;
        tracing::debug!(%signature, instructions = instructions.len(), "submitted");
        Ok(signature)
    }

    async fn account_data(&self, address: &Pubkey) -> ClientResult<bytes::Bytes> {
        match self.ledger.get_account(address).await? {
            Some(account) if !account.data.is_empty() => Ok(account.data),
            _ => Err(LedgerError::AccountNotFound(*address).into()),
        }
    }

    fn owned_by(&self, discriminator: &Discriminator) -> Vec<AccountFilter> {
        vec![
            AccountFilter::memcmp(0, discriminator.to_vec()),
            AccountFilter::memcmp(wire::OWNER_OFFSET, self.owner().to_bytes().to_vec()),
        ]
    }

    fn under(parent: u32) -> AccountFilter {
        AccountFilter::memcmp(wire::PARENT_OFFSET, parent.to_le_bytes().to_vec())
    }

    async fn scan_folders(&self, filters: Vec<AccountFilter>) -> ClientResult<Vec<Keyed<Folder>>> {
        let found = self
            .ledger
            .get_program_accounts(&self.program_id(), &filters)
            .await?;
        let folders: Vec<_> = found
            .into_iter()
            .filter_map(|(address, account)| match wire::decode_folder(&account.data) {
                Ok(folder) => Some(Keyed::new(address, folder)),
                Err(e) => {
                    tracing::warn!(address = %address.fmt_short(), error = %e, "skipping undecodable folder");
                    None
                }
            })
            .collect();
        tracing::debug!(count = folders.len(), "fetched folders");
        Ok(folders)
    }

    async fn scan_files(
        &self,
        filters: Vec<AccountFilter>,
        with_content: bool,
    ) -> ClientResult<Vec<Keyed<File>>> {
        let found = self
            .ledger
            .get_program_accounts(&self.program_id(), &filters)
            .await?;
        let files: Vec<_> = found
            .into_iter()
            .filter_map(
                |(address, account)| match wire::decode_file(&account.data, with_content) {
                    Ok(file) => Some(Keyed::new(address, file)),
                    Err(e) => {
                        tracing::warn!(address = %address.fmt_short(), error = %e, "skipping undecodable file");
                        None
                    }
                },
            )
            .collect();
        tracing::debug!(count = files.len(), with_content, "fetched files");
        Ok(files)
    }
}

#[async_trait]
impl<L: Ledger> DriveApi for LedgerClient<L> {
    fn owner(&self) -> Pubkey {
        self.builder.authority()
    }

    async fn fetch_user(&self) -> ClientResult<User> {
        let address = self.builder.deriver().user()?;
        let data = self.account_data(&address).await?;
        Ok(wire::decode_user(&data).map_err(LedgerError::from)?)
    }

    async fn create_user(&self) -> ClientResult<()> {
        self.send(&[self.builder.create_user()?]).await?;
        tracing::info!(owner = %self.owner().fmt_short(), "user created");
        Ok(())
    }

    async fn fetch_folder(&self, id: u32) -> ClientResult<Keyed<Folder>> {
        let address = self.builder.deriver().folder(id)?;
        let data = self.account_data(&address).await?;
        let folder = wire::decode_folder(&data).map_err(LedgerError::from)?;
        Ok(Keyed::new(address, folder))
    }

    async fn fetch_folders(&self, ids: Option<&[u32]>) -> ClientResult<Vec<Keyed<Folder>>> {
        match ids {
            Some(ids) => try_join_all(ids.iter().map(|id| self.fetch_folder(*id))).await,
            None => {
                self.scan_folders(self.owned_by(&wire::FOLDER_DISCRIMINATOR))
                    .await
            }
        }
    }

    async fn create_folder(&self, parent: u32, name: Vec<u8>) -> ClientResult<u32> {
        let id = self
            .fetch_user()
            .await?
            .next_folder_id()
            .map_err(LedgerError::from)?;
        self.send(&[self.builder.create_folder(id, parent, name)?])
            .await?;
        tracing::debug!(id, parent, "folder created");
        Ok(id)
    }

    async fn update_folder(&self, id: u32, update: FolderUpdate) -> ClientResult<()> {
        self.send(&[self.builder.update_folder(id, update)?]).await?;
        Ok(())
    }

    async fn remove_folder(&self, id: u32) -> ClientResult<()> {
        self.send(&[self.builder.remove_folder(id)?]).await?;
        Ok(())
    }

    async fn fetch_file(&self, id: u32, with_content: bool) -> ClientResult<Keyed<File>> {
        let address = self.builder.deriver().file(id)?;
        let data = self.account_data(&address).await?;
        let file = wire::decode_file(&data, with_content).map_err(LedgerError::from)?;
        Ok(Keyed::new(address, file))
    }

    async fn fetch_files(
        &self,
        query: FileQuery,
        with_content: bool,
    ) -> ClientResult<Vec<Keyed<File>>> {
        let mut filters = self.owned_by(&wire::FILE_DISCRIMINATOR);
        match query {
            FileQuery::All => {}
            FileQuery::Children(parent) => filters.push(Self::under(parent)),
            FileQuery::Ids(ids) => {
                return try_join_all(ids.iter().map(|id| self.fetch_file(*id, with_content)))
                    .await;
            }
        }
        self.scan_files(filters, with_content).await
    }

    async fn create_file(&self, file: NewFile) -> ClientResult<u32> {
        let id = self
            .fetch_user()
            .await?
            .next_file_id()
            .map_err(LedgerError::from)?;
        let max_size = file.max_size;
        self.send(&[self.builder.create_file(id, file)?]).await?;
        tracing::debug!(id, max_size, "file created");
        Ok(id)
    }

    async fn update_file(&self, id: u32, update: FileUpdate) -> ClientResult<()> {
        self.send(&[self.builder.update_file(id, update)?]).await?;
        Ok(())
    }

    async fn remove_file(&self, id: u32) -> ClientResult<()> {
        self.send(&[self.builder.remove_file(id)?]).await?;
        Ok(())
    }

    async fn replace_file(&self, old_id: u32, file: NewFile) -> ClientResult<u32> {
        let id = self
            .fetch_user()
            .await?
            .next_file_id()
            .map_err(LedgerError::from)?;
        let max_size = file.max_size;
        self.send(&[
            self.builder.remove_file(old_id)?,
            self.builder.create_file(id, file)?,
        ])
        .await?;
        tracing::info!(old_id, id, max_size, "file recreated");
        Ok(id)
    }

    async fn fetch_children(&self, parent: u32, with_content: bool) -> ClientResult<Children> {
        let mut folder_filters = self.owned_by(&wire::FOLDER_DISCRIMINATOR);
        folder_filters.push(Self::under(parent));
        let mut file_filters = self.owned_by(&wire::FILE_DISCRIMINATOR);
        file_filters.push(Self::under(parent));

        let (folders, files) = futures::try_join!(
            self.scan_folders(folder_filters),
            self.scan_files(file_filters, with_content),
        )?;
        Ok(Children { folders, files })
    }

    async fn update_parent(
        &self,
        file_ids: &[u32],
        folder_ids: &[u32],
        parent: u32,
    ) -> ClientResult<()> {
        let mut instructions = Vec::with_capacity(file_ids.len() + folder_ids.len());
        for id in file_ids {
            instructions.push(self.builder.update_file(*id, FileUpdate::parent(parent))?);
        }
        for id in folder_ids {
            instructions.push(self.builder.update_folder(*id, FolderUpdate::parent(parent))?);
        }
        if instructions.is_empty() {
            return Ok(());
        }
        self.send(&instructions).await?;
        tracing::info!(
            files = file_ids.len(),
            folders = folder_ids.len(),
            parent,
            "moved items"
        );
        Ok(())
    }

    async fn sign_challenge(&self) -> ClientResult<Signature> {
        let tx = Transaction::new_signed(
            &[self.builder.sign()],
            self.signer.as_ref(),
            &[],
            Blockhash::ZERO,
        )
        .map_err(LedgerError::from)?;
        tx.signature()
            .copied()
            .ok_or_else(|| LedgerError::rejected("challenge transaction was not signed").into())
    }

    async fn rent(&self, len: usize) -> ClientResult<u64> {
        Ok(self.ledger.minimum_balance_for_rent_exemption(len).await?)
    }

    async fn balance(&self) -> ClientResult<u64> {
        Ok(self.ledger.get_balance(&self.owner()).await?)
    }

    async fn airdrop(&self, lamports: u64) -> ClientResult<Signature> {
        Ok(self.ledger.request_airdrop(&self.owner(), lamports).await?)
    }
}

