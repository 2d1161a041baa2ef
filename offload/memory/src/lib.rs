use std::sync::atomic::{AtomicU64, Ordering};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use dashmap::DashMap;
use sd_core::{
    ContentId,
    offload::{ContentStore, OffloadError, OffloadResult},
};

/// A content store that keeps payloads in memory, addressed by their
/// BLAKE3 hash.
///
/// Uploads are billed at a fixed per-byte price against an in-memory
/// balance.
#[derive(Debug)]
pub struct MemoryContentStore {
    files: DashMap<ContentId, Bytes>,
    price_per_byte: u64,
    balance: AtomicU64,
}

impl MemoryContentStore {
    /// Creates a new, empty store where uploads are free.
    pub fn new() -> Self {
        Self::with_pricing(0, u64::MAX)
    }

    pub fn with_pricing(price_per_byte: u64, balance: u64) -> Self {
        Self {
            files: DashMap::new(),
            price_per_byte,
            balance: AtomicU64::new(balance),
        }
    }

    pub fn content_id(data: &[u8]) -> ContentId {
        ContentId::new(URL_SAFE_NO_PAD.encode(blake3::hash(data).as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, data: Bytes) -> OffloadResult<ContentId> {
        let cost = self.price_per_byte.saturating_mul(data.len() as u64);
        self.balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |balance| {
                balance.checked_sub(cost)
            })
            .map_err(|balance| OffloadError::InsufficientFunds { balance, cost })?;
        let id = Self::content_id(&data);
        tracing::debug!(%id, len = data.len(), cost, "stored payload");
        self.files.insert(id.clone(), data);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> OffloadResult<Bytes> {
        self.files
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OffloadError::NotFound(id.clone()))
    }

    async fn price(&self, len: u64) -> OffloadResult<u64> {
        Ok(self.price_per_byte.saturating_mul(len))
    }

    async fn balance(&self) -> OffloadResult<u64> {
        Ok(self.balance.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_by_content_hash() {
        let store = MemoryContentStore::new();
        let id = store.put(Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(id, MemoryContentStore::content_id(b"payload"));
        assert_eq!(id.as_str().len(), 43);
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"payload"));

        let again = store.put(Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(again, id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = MemoryContentStore::new();
        let err = store.get(&ContentId::new("missing")).await.unwrap_err();
        assert!(matches!(err, OffloadError::NotFound(_)));
    }

    #[tokio::test]
    async fn uploads_are_billed() {
        let store = MemoryContentStore::with_pricing(2, 10);
        assert_eq!(store.price(4).await.unwrap(), 8);
        store.put_funded(Bytes::from_static(b"abcd")).await.unwrap();
        assert_eq!(store.balance().await.unwrap(), 2);

        let err = store
            .put_funded(Bytes::from_static(b"abcd"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OffloadError::InsufficientFunds { balance: 2, cost: 8 }
        ));
        assert!(err.to_string().starts_with("Insufficient funds"));
        assert_eq!(store.len(), 1);
    }
}
