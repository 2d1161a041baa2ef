//! The ciphertext-level record API shared by the ledger client and its
//! decorators.

use std::sync::Arc;

use async_trait::async_trait;
use sd_core::{
    File, FileUpdate, Folder, FolderUpdate, Keyed, NewFile, Pubkey, Signature, User,
};

use crate::error::ClientResult;

/// Which files a scan returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileQuery {
    /// Every file of the owner.
    All,
    /// Files directly under a folder.
    Children(u32),
    /// Specific files, in the given order.
    Ids(Vec<u32>),
}

/// Direct children of a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children {
    pub folders: Vec<Keyed<Folder>>,
    pub files: Vec<Keyed<File>>,
}

/// Record operations of one owner. Names and content are opaque bytes at
/// this level.
///
/// Every mutating call is one submission; `replace_file` and
/// `update_parent` submit their instructions as a single atomic group.
#[async_trait]
pub trait DriveApi: Send + Sync {
    fn owner(&self) -> Pubkey;

    async fn fetch_user(&self) -> ClientResult<User>;
    async fn create_user(&self) -> ClientResult<()>;

    async fn fetch_folder(&self, id: u32) -> ClientResult<Keyed<Folder>>;
    /// `None` scans all folders of the owner.
    async fn fetch_folders(&self, ids: Option<&[u32]>) -> ClientResult<Vec<Keyed<Folder>>>;
    /// Returns the id of the new folder.
    async fn create_folder(&self, parent: u32, name: Vec<u8>) -> ClientResult<u32>;
    async fn update_folder(&self, id: u32, update: FolderUpdate) -> ClientResult<()>;
    async fn remove_folder(&self, id: u32) -> ClientResult<()>;

    async fn fetch_file(&self, id: u32, with_content: bool) -> ClientResult<Keyed<File>>;
    async fn fetch_files(
        &self,
        query: FileQuery,
        with_content: bool,
    ) -> ClientResult<Vec<Keyed<File>>>;
    /// Returns the id of the new file.
    async fn create_file(&self, file: NewFile) -> ClientResult<u32>;
    async fn update_file(&self, id: u32, update: FileUpdate) -> ClientResult<()>;
    async fn remove_file(&self, id: u32) -> ClientResult<()>;
    /// Removes `old_id` and creates `file` under the next file id in one
    /// group. Returns the new id.
    async fn replace_file(&self, old_id: u32, file: NewFile) -> ClientResult<u32>;

    async fn fetch_children(&self, parent: u32, with_content: bool) -> ClientResult<Children>;
    /// Moves files and folders under `parent` in one group.
    async fn update_parent(
        &self,
        file_ids: &[u32],
        folder_ids: &[u32],
        parent: u32,
    ) -> ClientResult<()>;

    /// Signs the program's no-op challenge without submitting it.
    async fn sign_challenge(&self) -> ClientResult<Signature>;

    /// Rent for a ledger account holding `len` bytes.
    async fn rent(&self, len: usize) -> ClientResult<u64>;
    async fn balance(&self) -> ClientResult<u64>;
    async fn airdrop(&self, lamports: u64) -> ClientResult<Signature>;
}

#[async_trait]
impl<T: DriveApi + ?Sized> DriveApi for Arc<T> {
    fn owner(&self) -> Pubkey {
        (**self).owner()
    }

    async fn fetch_user(&self) -> ClientResult<User> {
        (**self).fetch_user().await
    }

    async fn create_user(&self) -> ClientResult<()> {
        (**self).create_user().await
    }

    async fn fetch_folder(&self, id: u32) -> ClientResult<Keyed<Folder>> {
        (**self).fetch_folder(id).await
    }

    async fn fetch_folders(&self, ids: Option<&[u32]>) -> ClientResult<Vec<Keyed<Folder>>> {
        (**self).fetch_folders(ids).await
    }

    async fn create_folder(&self, parent: u32, name: Vec<u8>) -> ClientResult<u32> {
        (**self).create_folder(parent, name).await
    }

    async fn update_folder(&self, id: u32, update: FolderUpdate) -> ClientResult<()> {
        (**self).update_folder(id, update).await
    }

    async fn remove_folder(&self, id: u32) -> ClientResult<()> {
        (**self).remove_folder(id).await
    }

    async fn fetch_file(&self, id: u32, with_content: bool) -> ClientResult<Keyed<File>> {
        (**self).fetch_file(id, with_content).await
    }

    async fn fetch_files(
        &self,
        query: FileQuery,
        with_content: bool,
    ) -> ClientResult<Vec<Keyed<File>>> {
        (**self).fetch_files(query, with_content).await
    }

    async fn create_file(&self, file: NewFile) -> ClientResult<u32> {
        (**self).create_file(file).await
    }

    async fn update_file(&self, id: u32, update: FileUpdate) -> ClientResult<()> {
        (**self).update_file(id, update).await
    }

    async fn remove_file(&self, id: u32) -> ClientResult<()> {
        (**self).remove_file(id).await
    }

    async fn replace_file(&self, old_id: u32, file: NewFile) -> ClientResult<u32> {
        (**self).replace_file(old_id, file).await
    }

    async fn fetch_children(&self, parent: u32, with_content: bool) -> ClientResult<Children> {
        (**self).fetch_children(parent, with_content).await
    }

    async fn update_parent(
        &self,
        file_ids: &[u32],
        folder_ids: &[u32],
        parent: u32,
    ) -> ClientResult<()> {
        (**self).update_parent(file_ids, folder_ids, parent).await
    }

    async fn sign_challenge(&self) -> ClientResult<Signature> {
        (**self).sign_challenge().await
    }

    async fn rent(&self, len: usize) -> ClientResult<u64> {
        (**self).rent(len).await
    }

    async fn balance(&self) -> ClientResult<u64> {
        (**self).balance().await
    }

    async fn airdrop(&self, lamports: u64) -> ClientResult<Signature> {
        (**self).airdrop(lamports).await
    }
}
