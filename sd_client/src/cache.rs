//! Read Cache: remembers decoded records by id and forgets them on every
//! local mutation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use sd_core::{
    File, FileUpdate, Folder, FolderUpdate, Keyed, NewFile, Pubkey, Signature, User,
};

use crate::{
    api::{Children, DriveApi, FileQuery},
    error::ClientResult,
};

/// Last-known folders and files of one owner, keyed by id.
///
/// The cache is owned by the client that fills it. Changes made by other
/// clients are only seen once an entry is evicted and fetched again.
#[derive(Debug, Default)]
pub struct ReadCache {
    folders: DashMap<u32, Keyed<Folder>>,
    files: DashMap<u32, Keyed<File>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folder(&self, id: u32) -> Option<Keyed<Folder>> {
        self.folders.get(&id).map(|entry| entry.value().clone())
    }

    /// A cached file, provided it carries content when `with_content` is
    /// requested.
    pub fn file(&self, id: u32, with_content: bool) -> Option<Keyed<File>> {
        self.files
            .get(&id)
            .filter(|entry| !with_content || entry.record.content.is_some())
            .map(|entry| entry.value().clone())
    }

    pub fn insert_folder(&self, folder: Keyed<Folder>) {
        self.folders.insert(folder.record.id, folder);
    }

    pub fn insert_file(&self, file: Keyed<File>) {
        self.files.insert(file.record.id, file);
    }

    pub fn evict_folder(&self, id: u32) {
        self.folders.remove(&id);
    }

    pub fn evict_file(&self, id: u32) {
        self.files.remove(&id);
    }

    pub fn invalidate_all(&self) {
        self.folders.clear();
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decorates a [`DriveApi`] with a [`ReadCache`].
#[derive(Debug)]
pub struct CachedDrive<A> {
    inner: A,
    cache: Arc<ReadCache>,
}

impl<A: DriveApi> CachedDrive<A> {
    pub fn new(inner: A) -> Self {
        Self::with_cache(inner, Arc::new(ReadCache::new()))
    }

    pub fn with_cache(inner: A, cache: Arc<ReadCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: DriveApi> DriveApi for CachedDrive<A> {
    fn owner(&self) -> Pubkey {
        self.inner.owner()
    }

    async fn fetch_user(&self) -> ClientResult<User> {
        self.inner.fetch_user().await
    }

    async fn create_user(&self) -> ClientResult<()> {
        self.inner.create_user().await
    }

    async fn fetch_folder(&self, id: u32) -> ClientResult<Keyed<Folder>> {
        if let Some(hit) = self.cache.folder(id) {
            return Ok(hit);
        }
        let folder = self.inner.fetch_folder(id).await?;
        self.cache.insert_folder(folder.clone());
        Ok(folder)
    }

    async fn fetch_folders(&self, ids: Option<&[u32]>) -> ClientResult<Vec<Keyed<Folder>>> {
        let Some(ids) = ids else {
            return self.inner.fetch_folders(None).await;
        };
        let mut found: HashMap<u32, Keyed<Folder>> = HashMap::new();
        let mut missing = Vec::new();
        for id in ids {
            match self.cache.folder(*id) {
                Some(hit) => {
                    found.insert(*id, hit);
                }
                None => missing.push(*id),
            }
        }
        if !missing.is_empty() {
            tracing::debug!(hits = found.len(), misses = missing.len(), "folder cache");
            for folder in self.inner.fetch_folders(Some(&missing)).await? {
                self.cache.insert_folder(folder.clone());
                found.insert(folder.record.id, folder);
            }
        }
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    async fn create_folder(&self, parent: u32, name: Vec<u8>) -> ClientResult<u32> {
        self.inner.create_folder(parent, name).await
    }

    async fn update_folder(&self, id: u32, update: FolderUpdate) -> ClientResult<()> {
        self.cache.evict_folder(id);
        self.inner.update_folder(id, update).await
    }

    async fn remove_folder(&self, id: u32) -> ClientResult<()> {
        self.cache.evict_folder(id);
        self.inner.remove_folder(id).await
    }

    async fn fetch_file(&self, id: u32, with_content: bool) -> ClientResult<Keyed<File>> {
        if let Some(hit) = self.cache.file(id, with_content) {
            return Ok(hit);
        }
        let file = self.inner.fetch_file(id, with_content).await?;
        self.cache.insert_file(file.clone());
        Ok(file)
    }

    async fn fetch_files(
        &self,
        query: FileQuery,
        with_content: bool,
    ) -> ClientResult<Vec<Keyed<File>>> {
        match query {
            FileQuery::Ids(ids) => {
                let mut files = Vec::with_capacity(ids.len());
                for id in ids {
                    files.push(self.fetch_file(id, with_content).await?);
                }
                Ok(files)
            }
            scan => self.inner.fetch_files(scan, with_content).await,
        }
    }

    async fn create_file(&self, file: NewFile) -> ClientResult<u32> {
        self.inner.create_file(file).await
    }

    async fn update_file(&self, id: u32, update: FileUpdate) -> ClientResult<()> {
        self.cache.evict_file(id);
        self.inner.update_file(id, update).await
    }

    async fn remove_file(&self, id: u32) -> ClientResult<()> {
        self.cache.evict_file(id);
        self.inner.remove_file(id).await
    }

    async fn replace_file(&self, old_id: u32, file: NewFile) -> ClientResult<u32> {
        self.cache.evict_file(old_id);
        self.inner.replace_file(old_id, file).await
    }

    async fn fetch_children(&self, parent: u32, with_content: bool) -> ClientResult<Children> {
        self.inner.fetch_children(parent, with_content).await
    }

    async fn update_parent(
        &self,
        file_ids: &[u32],
        folder_ids: &[u32],
        parent: u32,
    ) -> ClientResult<()> {
        for id in file_ids {
            self.cache.evict_file(*id);
        }
        for id in folder_ids {
            self.cache.evict_folder(*id);
        }
        self.inner.update_parent(file_ids, folder_ids, parent).await
    }

    async fn sign_challenge(&self) -> ClientResult<Signature> {
        self.inner.sign_challenge().await
    }

    async fn rent(&self, len: usize) -> ClientResult<u64> {
        self.inner.rent(len).await
    }

    async fn balance(&self) -> ClientResult<u64> {
        self.inner.balance().await
    }

    async fn airdrop(&self, lamports: u64) -> ClientResult<Signature> {
        self.inner.airdrop(lamports).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sd_core::{LedgerError, Pubkey};

    /// Serves fixed folders and counts how often each path is taken.
    #[derive(Default)]
    struct CountingApi {
        folder_fetches: AtomicUsize,
        scans: AtomicUsize,
        file_fetches: AtomicUsize,
        names: DashMap<u32, Vec<u8>>,
    }

    fn folder(id: u32, name: &[u8]) -> Keyed<Folder> {
        Keyed::new(
            Pubkey::new_from_array([id as u8; 32]),
            Folder {
                owner: Pubkey::default(),
                id,
                created_at: 0,
                parent: 0,
                name: name.to_vec(),
            },
        )
    }

    fn file(id: u32, content: Option<&'static [u8]>) -> Keyed<File> {
        Keyed::new(
            Pubkey::new_from_array([id as u8; 32]),
            File {
                owner: Pubkey::default(),
                id,
                created_at: 0,
                parent: 0,
                name: b"f".to_vec(),
                file_ext: String::new(),
                file_size: 0,
                access: Default::default(),
                backend: Default::default(),
                size: content.map_or(0, |c| c.len() as u32),
                max_size: 8,
                content: content.map(bytes::Bytes::from_static),
            },
        )
    }

    #[async_trait]
    impl DriveApi for CountingApi {
        fn owner(&self) -> Pubkey {
            Pubkey::default()
        }
        async fn fetch_user(&self) -> ClientResult<User> {
            Ok(User::default())
        }
        async fn create_user(&self) -> ClientResult<()> {
            Ok(())
        }
        async fn fetch_folder(&self, id: u32) -> ClientResult<Keyed<Folder>> {
            self.folder_fetches.fetch_add(1, Ordering::SeqCst);
            let name = self
                .names
                .get(&id)
                .map(|n| n.value().clone())
                .ok_or(LedgerError::AccountNotFound(Pubkey::default()))?;
            Ok(folder(id, &name))
        }
        async fn fetch_folders(&self, ids: Option<&[u32]>) -> ClientResult<Vec<Keyed<Folder>>> {
            match ids {
                Some(ids) => {
                    let mut out = Vec::new();
                    for id in ids {
                        out.push(self.fetch_folder(*id).await?);
                    }
                    Ok(out)
                }
                None => {
                    self.scans.fetch_add(1, Ordering::SeqCst);
                    Ok(self.names.iter().map(|e| folder(*e.key(), e.value())).collect())
                }
            }
        }
        async fn create_folder(&self, _: u32, _: Vec<u8>) -> ClientResult<u32> {
            Ok(1)
        }
        async fn update_folder(&self, id: u32, update: FolderUpdate) -> ClientResult<()> {
            if let Some(name) = update.name {
                self.names.insert(id, name);
            }
            Ok(())
        }
        async fn remove_folder(&self, id: u32) -> ClientResult<()> {
            self.names.remove(&id);
            Ok(())
        }
        async fn fetch_file(&self, id: u32, with_content: bool) -> ClientResult<Keyed<File>> {
            self.file_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(file(id, with_content.then_some(b"data".as_slice())))
        }
        async fn fetch_files(&self, _: FileQuery, _: bool) -> ClientResult<Vec<Keyed<File>>> {
            Ok(Vec::new())
        }
        async fn create_file(&self, _: NewFile) -> ClientResult<u32> {
            Ok(1)
        }
        async fn update_file(&self, _: u32, _: FileUpdate) -> ClientResult<()> {
            Ok(())
        }
        async fn remove_file(&self, _: u32) -> ClientResult<()> {
            Ok(())
        }
        async fn replace_file(&self, old_id: u32, _: NewFile) -> ClientResult<u32> {
            Ok(old_id + 1)
        }
        async fn fetch_children(&self, _: u32, _: bool) -> ClientResult<Children> {
            Ok(Children::default())
        }
        async fn update_parent(&self, _: &[u32], _: &[u32], _: u32) -> ClientResult<()> {
            Ok(())
        }
        async fn sign_challenge(&self) -> ClientResult<Signature> {
            Ok(Signature::default())
        }
        async fn rent(&self, _: usize) -> ClientResult<u64> {
            Ok(0)
        }
        async fn balance(&self) -> ClientResult<u64> {
            Ok(0)
        }
        async fn airdrop(&self, _: u64) -> ClientResult<Signature> {
            Ok(Signature::default())
        }
    }

    fn cached() -> CachedDrive<CountingApi> {
        let api = CountingApi::default();
        api.names.insert(1, b"one".to_vec());
        api.names.insert(2, b"two".to_vec());
        CachedDrive::new(api)
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let drive = cached();
        drive.fetch_folders(Some(&[1, 2])).await.unwrap();
        let again = drive.fetch_folders(Some(&[2, 1])).await.unwrap();
        assert_eq!(again[0].record.name, b"two");
        assert_eq!(again[1].record.name, b"one");
        assert_eq!(drive.inner().folder_fetches.load(Ordering::SeqCst), 2);
        drive.fetch_folder(1).await.unwrap();
        assert_eq!(drive.inner().folder_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unbounded_scans_bypass_the_cache() {
        let drive = cached();
        drive.fetch_folders(None).await.unwrap();
        drive.fetch_folders(None).await.unwrap();
        assert_eq!(drive.inner().scans.load(Ordering::SeqCst), 2);
        assert!(drive.cache().is_empty());
    }

    #[tokio::test]
    async fn mutations_evict_before_delegating() {
        let drive = cached();
        drive.fetch_folders(Some(&[1])).await.unwrap();
        drive
            .update_folder(
                1,
                FolderUpdate {
                    name: Some(b"renamed".to_vec()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let fresh = drive.fetch_folders(Some(&[1])).await.unwrap();
        assert_eq!(fresh[0].record.name, b"renamed");

        drive.remove_folder(1).await.unwrap();
        let err = drive.fetch_folders(Some(&[1])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn content_reads_skip_headers_only_entries() {
        let drive = cached();
        let header = drive.fetch_file(5, false).await.unwrap();
        assert!(header.record.content.is_none());
        let full = drive.fetch_file(5, true).await.unwrap();
        assert_eq!(full.record.content.as_deref(), Some(&b"data"[..]));
        drive.fetch_file(5, false).await.unwrap();
        drive.fetch_file(5, true).await.unwrap();
        assert_eq!(drive.inner().file_fetches.load(Ordering::SeqCst), 2);

        drive.replace_file(5, NewFile::default()).await.unwrap();
        drive.fetch_file(5, false).await.unwrap();
        assert_eq!(drive.inner().file_fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_moves_evict_every_item() {
        let drive = cached();
        drive.fetch_folder(1).await.unwrap();
        drive.fetch_file(3, false).await.unwrap();
        assert_eq!(drive.cache().len(), 2);
        drive.update_parent(&[3], &[1], 2).await.unwrap();
        assert!(drive.cache().is_empty());
    }
}
