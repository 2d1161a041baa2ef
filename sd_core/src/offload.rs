//! External storage for payloads too large to keep on the ledger.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier the external network assigns to an uploaded payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum OffloadError {
    #[error("content {0} not found")]
    NotFound(ContentId),
    #[error("Insufficient funds: balance {balance}, cost {cost}")]
    InsufficientFunds { balance: u64, cost: u64 },
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("offload transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

pub type OffloadResult<T> = std::result::Result<T, OffloadError>;

/// A content store on an external decentralized network.
///
/// Prices and balances are in lamports so they compare directly with ledger
/// rent.
#[async_trait]
pub trait ContentStore: fmt::Debug + Send + Sync + 'static {
    async fn put(&self, data: Bytes) -> OffloadResult<ContentId>;

    async fn get(&self, id: &ContentId) -> OffloadResult<Bytes>;

    /// Cost of storing `len` bytes.
    async fn price(&self, len: u64) -> OffloadResult<u64>;

    /// Funds available for uploads.
    async fn balance(&self) -> OffloadResult<u64>;

    /// Uploads `data` after checking that the balance covers its price.
    async fn put_funded(&self, data: Bytes) -> OffloadResult<ContentId> {
        let balance = self.balance().await?;
        let cost = self.price(data.len() as u64).await?;
        if balance < cost {
            return Err(OffloadError::InsufficientFunds { balance, cost });
        }
        self.put(data).await
    }
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn put(&self, data: Bytes) -> OffloadResult<ContentId> {
        (**self).put(data).await
    }

    async fn get(&self, id: &ContentId) -> OffloadResult<Bytes> {
        (**self).get(id).await
    }

    async fn price(&self, len: u64) -> OffloadResult<u64> {
        (**self).price(len).await
    }

    async fn balance(&self) -> OffloadResult<u64> {
        (**self).balance().await
    }
}
