//! Plaintext view of a drive.
//!
//! [`Drive`] sits on top of any [`DriveApi`] and translates between the
//! ciphertext records stored on the ledger and the names and content a
//! user works with. Folder names are always sealed with the owner's
//! private key. File names and content use the private key only for
//! [`Access::Private`] files and the public key otherwise.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use sd_core::{
    Access, Backend, File, FileUpdate, Folder, FolderUpdate, Keyed, Ledger, NewFile, Pubkey,
    Signature, Signer, User,
};

use crate::{
    api::{DriveApi, FileQuery},
    batch,
    cache::CachedDrive,
    encryption::{Encryption, EncryptionConfig},
    error::{ClientError, ClientResult},
    lifecycle::{self, FileUpdateOutcome},
    offload::{self, MegabyteCosts, Offload, OffloadPolicy},
    raw::LedgerClient,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub address: Pubkey,
    pub id: u32,
    pub parent: u32,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub address: Pubkey,
    pub id: u32,
    pub parent: u32,
    pub name: String,
    pub file_ext: String,
    /// Plaintext size as uploaded.
    pub file_size: u64,
    pub access: Access,
    pub backend: Backend,
    /// Stored ciphertext length and reserved capacity.
    pub size: u32,
    pub max_size: u32,
    pub created_at: i64,
    /// Decrypted account content. For external files this is the link,
    /// use [`Drive::download`] for the payload.
    pub content: Option<Bytes>,
}

/// Arguments for [`Drive::create_file`].
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub parent: u32,
    pub name: String,
    pub file_ext: String,
    pub access: Access,
    pub content: Bytes,
    /// Capacity to reserve; raised to the stored length when smaller.
    pub max_size: Option<u32>,
    /// Overrides the drive's offload policy for this file.
    pub policy: Option<OffloadPolicy>,
}

#[derive(Debug, Clone, Default)]
pub struct FolderEdit {
    pub parent: Option<u32>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileEdit {
    pub parent: Option<u32>,
    pub name: Option<String>,
    pub file_ext: Option<String>,
    pub access: Option<Access>,
    pub content: Option<Bytes>,
    pub policy: Option<OffloadPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

/// How far a user has got through sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoWallet,
    /// Wallet connected but no user record yet.
    NoUser,
    /// The user record could not be read.
    LoggedOut,
    /// User exists but encryption is still locked.
    NoEncryption,
    LoggedIn,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthState::NoWallet => "no wallet",
            AuthState::NoUser => "no user",
            AuthState::LoggedOut => "logged out",
            AuthState::NoEncryption => "encryption locked",
            AuthState::LoggedIn => "logged in",
        })
    }
}

/// Auth state of an optional drive; `None` means no wallet is connected.
pub async fn auth_state<A: DriveApi>(drive: Option<&Drive<A>>) -> AuthState {
    match drive {
        Some(drive) => drive.auth_state().await,
        None => AuthState::NoWallet,
    }
}

pub struct Drive<A> {
    api: A,
    encryption: Arc<Encryption>,
    offload: Option<Offload>,
}

impl<A> fmt::Debug for Drive<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drive")
            .field("owner", &self.encryption.owner())
            .field("offload", &self.offload)
            .finish_non_exhaustive()
    }
}

impl<L: Ledger> Drive<CachedDrive<LedgerClient<L>>> {
    /// A cached drive over `ledger` for the wallet behind `signer`.
    pub fn open(
        ledger: L,
        signer: Arc<dyn Signer>,
        program_id: Pubkey,
        config: &EncryptionConfig,
    ) -> Self {
        let encryption = Arc::new(Encryption::from_config(signer.pubkey(), config));
        let client = LedgerClient::new(ledger, signer, program_id);
        Drive::new(CachedDrive::new(client), encryption)
    }
}

impl<A: DriveApi> Drive<A> {
    pub fn new(api: A, encryption: Arc<Encryption>) -> Self {
        Self {
            api,
            encryption,
            offload: None,
        }
    }

    pub fn with_offload(mut self, offload: Offload) -> Self {
        self.offload = Some(offload);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn encryption(&self) -> &Arc<Encryption> {
        &self.encryption
    }

    pub fn offload(&self) -> Option<&Offload> {
        self.offload.as_ref()
    }

    pub async fn auth_state(&self) -> AuthState {
        match self.api.fetch_user().await {
            Err(e) if e.is_not_found() => AuthState::NoUser,
            Err(e) => {
                tracing::debug!(error = %e, "user lookup failed");
                AuthState::LoggedOut
            }
            Ok(_) if self.encryption.is_unlocked() => AuthState::LoggedIn,
            Ok(_) => AuthState::NoEncryption,
        }
    }

    /// Fetches the user and restores encryption from the session without
    /// prompting the wallet.
    pub async fn login(&self) -> ClientResult<User> {
        let user = self.api.fetch_user().await?;
        self.encryption.unlock_from_session()?;
        Ok(user)
    }

    pub async fn unlock(&self) -> ClientResult<()> {
        self.encryption.unlock(&self.api).await
    }

    pub fn lock(&self) {
        self.encryption.lock();
    }

    pub async fn fetch_user(&self) -> ClientResult<User> {
        self.api.fetch_user().await
    }

    pub async fn create_user(&self) -> ClientResult<()> {
        self.api.create_user().await
    }

    pub async fn balance(&self) -> ClientResult<u64> {
        self.api.balance().await
    }

    pub async fn airdrop(&self, lamports: u64) -> ClientResult<Signature> {
        self.api.airdrop(lamports).await
    }

    pub async fn rent(&self, len: usize) -> ClientResult<u64> {
        self.api.rent(len).await
    }

    pub async fn costs_per_megabyte(&self) -> ClientResult<MegabyteCosts> {
        let offload = self.offload.as_ref().ok_or(ClientError::OffloadUnavailable)?;
        offload::costs_per_megabyte(&self.api, offload.store().as_ref()).await
    }

    fn seal_name(&self, name: &str, use_private: bool) -> ClientResult<Vec<u8>> {
        Ok(self.encryption.encrypt(name.as_bytes(), use_private)?)
    }

    fn open_name(&self, sealed: &[u8], use_private: bool) -> ClientResult<String> {
        let plain = self.encryption.decrypt(sealed, use_private)?;
        Ok(String::from_utf8(plain)?)
    }

    fn open_folder(&self, folder: Keyed<Folder>) -> ClientResult<FolderEntry> {
        let Keyed { address, record } = folder;
        Ok(FolderEntry {
            address,
            id: record.id,
            parent: record.parent,
            name: self.open_name(&record.name, true)?,
            created_at: record.created_at,
        })
    }

    fn open_file(&self, file: Keyed<File>) -> ClientResult<FileEntry> {
        let Keyed { address, record } = file;
        let use_private = record.access.is_private();
        let content = match &record.content {
            Some(sealed) => Some(Bytes::from(self.encryption.decrypt(sealed, use_private)?)),
            None => None,
        };
        Ok(FileEntry {
            address,
            id: record.id,
            parent: record.parent,
            name: self.open_name(&record.name, use_private)?,
            file_ext: record.file_ext,
            file_size: record.file_size,
            access: record.access,
            backend: record.backend,
            size: record.size,
            max_size: record.max_size,
            created_at: record.created_at,
            content,
        })
    }

    /// Encrypts `plaintext` and routes it to a backend. Returns the bytes
    /// to keep in the account and the backend they describe.
    async fn store_content(
        &self,
        plaintext: &[u8],
        use_private: bool,
        policy: Option<OffloadPolicy>,
    ) -> ClientResult<(Bytes, Backend)> {
        if plaintext.is_empty() {
            return Ok((Bytes::new(), Backend::Solana));
        }
        let offload = match (&self.offload, policy) {
            (Some(offload), Some(policy)) => Some(offload.with_policy(policy)),
            (Some(offload), None) => Some(offload.clone()),
            (None, Some(OffloadPolicy::External)) => return Err(ClientError::OffloadUnavailable),
            (None, _) => None,
        };

        let sealed = self.encryption.encrypt(plaintext, use_private)?;
        let backend = match &offload {
            Some(offload) => offload.choose(&self.api, sealed.len()).await?,
            None => Backend::Solana,
        };
        let Some(offload) = offload.filter(|_| !backend.is_on_ledger()) else {
            return Ok((sealed.into(), Backend::Solana));
        };

        let id = offload.store().put_funded(sealed.into()).await?;
        tracing::debug!(%id, len = plaintext.len(), "content offloaded");
        let link = self.encryption.encrypt(&offload::link(&id), use_private)?;
        Ok((link.into(), Backend::Arweave))
    }

    pub async fn fetch_folder(&self, id: u32) -> ClientResult<FolderEntry> {
        let folder = self.api.fetch_folder(id).await?;
        self.open_folder(folder)
    }

    pub async fn fetch_folders(&self, ids: Option<&[u32]>) -> ClientResult<Vec<FolderEntry>> {
        self.api
            .fetch_folders(ids)
            .await?
            .into_iter()
            .map(|f| self.open_folder(f))
            .collect()
    }

    pub async fn create_folder(&self, parent: u32, name: &str) -> ClientResult<u32> {
        let name = self.seal_name(name, true)?;
        self.api.create_folder(parent, name).await
    }

    pub async fn update_folder(&self, id: u32, edit: FolderEdit) -> ClientResult<()> {
        let name = match edit.name {
            Some(name) => Some(self.seal_name(&name, true)?),
            None => None,
        };
        let update = FolderUpdate {
            parent: edit.parent,
            name,
        };
        self.api.update_folder(id, update).await
    }

    pub async fn remove_folder(&self, id: u32) -> ClientResult<()> {
        self.api.remove_folder(id).await
    }

    pub async fn fetch_file(&self, id: u32, with_content: bool) -> ClientResult<FileEntry> {
        let file = self.api.fetch_file(id, with_content).await?;
        self.open_file(file)
    }

    pub async fn fetch_files(
        &self,
        query: FileQuery,
        with_content: bool,
    ) -> ClientResult<Vec<FileEntry>> {
        self.api
            .fetch_files(query, with_content)
            .await?
            .into_iter()
            .map(|f| self.open_file(f))
            .collect()
    }

    pub async fn fetch_children(&self, parent: u32, with_content: bool) -> ClientResult<Listing> {
        let children = self.api.fetch_children(parent, with_content).await?;
        Ok(Listing {
            folders: children
                .folders
                .into_iter()
                .map(|f| self.open_folder(f))
                .collect::<ClientResult<_>>()?,
            files: children
                .files
                .into_iter()
                .map(|f| self.open_file(f))
                .collect::<ClientResult<_>>()?,
        })
    }

    /// Creates a file. Capacity is the stored length unless `max_size`
    /// asks for more.
    pub async fn create_file(&self, entry: NewEntry) -> ClientResult<u32> {
        let use_private = entry.access.is_private();
        let name = self.seal_name(&entry.name, use_private)?;
        let (content, backend) = self
            .store_content(&entry.content, use_private, entry.policy)
            .await?;
        let max_size = entry
            .max_size
            .unwrap_or(0)
            .max(lifecycle::capacity_for(content.len())?);
        self.api
            .create_file(NewFile {
                max_size,
                parent: entry.parent,
                name,
                file_ext: entry.file_ext,
                file_size: entry.content.len() as u64,
                access: entry.access,
                backend,
                content,
            })
            .await
    }

    /// Applies `edit`. The file moves to a new id when its new content no
    /// longer fits; see [`FileUpdateOutcome`].
    pub async fn update_file(&self, id: u32, edit: FileEdit) -> ClientResult<FileUpdateOutcome> {
        let current = self.api.fetch_file(id, false).await?;
        let old_private = current.record.access.is_private();
        let access = edit.access.unwrap_or(current.record.access);
        let use_private = access.is_private();
        let rekey = old_private != use_private;

        let mut update = FileUpdate {
            parent: edit.parent,
            file_ext: edit.file_ext,
            access: edit.access.filter(|a| *a != current.record.access),
            ..Default::default()
        };

        let name = match edit.name {
            Some(name) => Some(name),
            None if rekey => Some(self.open_name(&current.record.name, old_private)?),
            None => None,
        };
        if let Some(name) = name {
            update.name = Some(self.seal_name(&name, use_private)?);
        }

        let content = match edit.content {
            Some(content) => Some(content),
            None if rekey => {
                let entry = self.fetch_file(id, true).await?;
                Some(self.download(&entry).await?)
            }
            None => None,
        };
        if let Some(plaintext) = content {
            let (stored, backend) = self.store_content(&plaintext, use_private, edit.policy).await?;
            update.file_size = Some(plaintext.len() as u64);
            update.backend = Some(backend).filter(|b| *b != current.record.backend);
            update.content = Some(stored);
        }

        lifecycle::update_file(&self.api, &current.record, update).await
    }

    pub async fn remove_file(&self, id: u32) -> ClientResult<()> {
        self.api.remove_file(id).await
    }

    pub async fn move_items(
        &self,
        file_ids: &[u32],
        folder_ids: &[u32],
        new_parent: u32,
    ) -> ClientResult<()> {
        batch::move_items(&self.api, file_ids, folder_ids, new_parent).await
    }

    /// The file's payload, fetched from the external store when the
    /// account only holds a link.
    pub async fn download(&self, entry: &FileEntry) -> ClientResult<Bytes> {
        let content = match &entry.content {
            Some(content) => content.clone(),
            None => {
                let file = self.fetch_file(entry.id, true).await?;
                file.content.unwrap_or_default()
            }
        };
        if content.is_empty() || entry.backend.is_on_ledger() {
            return Ok(content);
        }

        let id = offload::parse_link(&content)?;
        let offload = self.offload.as_ref().ok_or(ClientError::OffloadUnavailable)?;
        let payload = offload.store().get(&id).await?;
        let plain = self
            .encryption
            .decrypt(&payload, entry.access.is_private())?;
        Ok(plain.into())
    }
}
