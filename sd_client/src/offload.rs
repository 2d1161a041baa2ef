//! Routing of file content between the ledger and an external store.
//!
//! Content kept off the ledger is uploaded as ciphertext; the file account
//! then holds an encrypted link of the form `"<content id>\n"`.

use std::{fmt, str::FromStr, sync::Arc};

use sd_core::{Backend, ContentId, ContentStore};
use serde::{Deserialize, Serialize};

use crate::{
    api::DriveApi,
    error::{ClientError, ClientResult},
};

pub const MEGABYTE: u64 = 1_000_000;

/// Where new content goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OffloadPolicy {
    #[default]
    OnLedger,
    External,
    /// Whichever of ledger rent and upload price is lower.
    Cheapest,
}

impl FromStr for OffloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-ledger" | "ledger" | "solana" => Ok(OffloadPolicy::OnLedger),
            "external" | "arweave" => Ok(OffloadPolicy::External),
            "cheapest" => Ok(OffloadPolicy::Cheapest),
            other => Err(format!("unknown backend policy '{other}'")),
        }
    }
}

impl fmt::Display for OffloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OffloadPolicy::OnLedger => "on-ledger",
            OffloadPolicy::External => "external",
            OffloadPolicy::Cheapest => "cheapest",
        })
    }
}

/// An external store together with the policy for using it.
#[derive(Debug, Clone)]
pub struct Offload {
    store: Arc<dyn ContentStore>,
    policy: OffloadPolicy,
}

impl Offload {
    pub fn new(store: Arc<dyn ContentStore>, policy: OffloadPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn policy(&self) -> OffloadPolicy {
        self.policy
    }

    pub fn with_policy(&self, policy: OffloadPolicy) -> Self {
        Self {
            store: self.store.clone(),
            policy,
        }
    }

    /// Picks the backend for `len` bytes of ciphertext.
    pub async fn choose<A: DriveApi + ?Sized>(&self, api: &A, len: usize) -> ClientResult<Backend> {
        let backend = match self.policy {
            OffloadPolicy::OnLedger => Backend::Solana,
            OffloadPolicy::External => Backend::Arweave,
            OffloadPolicy::Cheapest => {
                let rent = api.rent(len).await?;
                let price = self.store.price(len as u64).await?;
                tracing::debug!(len, rent, price, "comparing storage costs");
                if price < rent {
                    Backend::Arweave
                } else {
                    Backend::Solana
                }
            }
        };
        Ok(backend)
    }
}

/// The link stored on the ledger for externally kept content.
pub fn link(id: &ContentId) -> Vec<u8> {
    format!("{id}\n").into_bytes()
}

/// Extracts the content id from the first line of a link.
pub fn parse_link(plaintext: &[u8]) -> ClientResult<ContentId> {
    let text = std::str::from_utf8(plaintext).map_err(|_| ClientError::InvalidLink)?;
    match text.split('\n').next().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(ContentId::new(id)),
        _ => Err(ClientError::InvalidLink),
    }
}

/// Storage cost of one megabyte on each backend, in lamports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MegabyteCosts {
    pub ledger: u64,
    pub external: u64,
}

pub async fn costs_per_megabyte<A: DriveApi + ?Sized>(
    api: &A,
    store: &dyn ContentStore,
) -> ClientResult<MegabyteCosts> {
    let ledger = api.rent(MEGABYTE as usize).await?;
    let external = store.price(MEGABYTE).await?;
    Ok(MegabyteCosts { ledger, external })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_round_trip() {
        let id = ContentId::new("bGluaw");
        assert_eq!(link(&id), b"bGluaw\n");
        assert_eq!(parse_link(&link(&id)).unwrap(), id);
        assert_eq!(parse_link(b"abc\nnote").unwrap(), ContentId::new("abc"));
        assert!(matches!(parse_link(b"\n"), Err(ClientError::InvalidLink)));
        assert!(matches!(parse_link(&[0xff, 0xfe]), Err(ClientError::InvalidLink)));
    }

    #[test]
    fn policy_parses_backend_names() {
        assert_eq!("solana".parse::<OffloadPolicy>().unwrap(), OffloadPolicy::OnLedger);
        assert_eq!("arweave".parse::<OffloadPolicy>().unwrap(), OffloadPolicy::External);
        assert_eq!("cheapest".parse::<OffloadPolicy>().unwrap(), OffloadPolicy::Cheapest);
        assert!("tape".parse::<OffloadPolicy>().is_err());
        assert_eq!(OffloadPolicy::Cheapest.to_string(), "cheapest");
    }
}
