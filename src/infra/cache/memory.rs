//! In-process cache used when no Redis is configured.
//!
//! Entries do not survive a restart, so the "max block id" marker and warm
//! charts are rebuilt by the startup sweep.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::{AppError, CacheClient};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Thread-safe expiring key-value store backed by DashMap.
#[derive(Debug, Default)]
pub struct MemoryCacheClient {
    store: DashMap<String, Entry>,
}

impl MemoryCacheClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Remaining lifetime of a key; `Some(None)` for keys without expiry.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        self.store
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.map(|at| at - now))
    }
}

#[async_trait]
impl CacheClient for MemoryCacheClient {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let now = Instant::now();
        // Expired entries are evicted lazily on read.
        let removed = self.store.remove_if(key, |_, entry| !entry.is_live(now));
        if removed.is_some() {
            return Ok(None);
        }
        Ok(self.store.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), AppError> {
        let entry = Entry {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.store.insert(key.to_string(), entry);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        Ok(self
            .store
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.store.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCacheClient::new();
        assert_ok!(cache.set("k", b"v", None).await);
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(cache.exists("k").await.unwrap());
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCacheClient::new();
        cache
            .set("k", b"v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_of_reports_infinite_entries() {
        let cache = MemoryCacheClient::new();
        cache.set("forever", b"1", None).await.unwrap();
        assert_eq!(cache.ttl_of("forever"), Some(None));
        assert_eq!(cache.ttl_of("missing"), None);
    }
}
