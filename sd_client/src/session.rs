//! Session-scoped storage for the challenge signature.
//!
//! The signature that encryption keys derive from is kept only for the
//! lifetime of a session so the wallet is not asked to sign on every
//! operation. Nothing here is ever written to disk.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sd_core::Pubkey;

/// Key under which the challenge signature of `owner` is stored.
pub fn session_key(owner: &Pubkey) -> String {
    format!("encryptionKey {owner}")
}

pub trait SessionStore: std::fmt::Debug + Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Keeps values in memory until the process exits or their TTL passes.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    ttl: Option<Duration>,
    values: DashMap<String, (String, Instant)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            values: DashMap::new(),
        }
    }

    fn expired(&self, stored_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .remove_if(key, |_, (_, stored_at)| self.expired(*stored_at));
        self.values.get(key).map(|entry| entry.0.clone())
    }

    fn put(&self, key: &str, value: String) {
        self.values
            .insert(key.to_owned(), (value, Instant::now()));
    }

    fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_owner() {
        let owner = Pubkey::new_from_array([0u8; 32]);
        assert_eq!(
            session_key(&owner),
            "encryptionKey 11111111111111111111111111111111"
        );
    }

    #[test]
    fn put_get_remove() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get("k"), None);
        store.put("k", "v".into());
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn values_expire() {
        let store = MemorySessionStore::with_ttl(Duration::ZERO);
        store.put("k", "v".into());
        assert_eq!(store.get("k"), None);

        let store = MemorySessionStore::with_ttl(Duration::from_secs(3600));
        store.put("k", "v".into());
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn shared_between_threads() {
        let store = MemorySessionStore::new();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    let key = format!("k{i}");
                    store.put(&key, i.to_string());
                    assert_eq!(store.get(&key), Some(i.to_string()));
                });
            }
        });
        assert_eq!(store.values.len(), 8);
    }
}
