//! Named response caches.
//!
//! Mirrors the browser Cache Storage model: several named caches, each
//! mapping a request path to a response, with lookups that search every
//! cache.

use async_trait::async_trait;
use pagemark_core::WorkerError;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::http::Response;

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every cache.
    async fn cache_names(&self) -> Result<Vec<String>, WorkerError>;

    /// First response cached under `path` in any cache.
    async fn match_any(&self, path: &str) -> Result<Option<Response>, WorkerError>;

    /// Store `response` under `path` in `cache`, creating the cache if needed.
    async fn put(&self, cache: &str, path: &str, response: Response) -> Result<(), WorkerError>;

    /// Remove `path` from `cache`. Returns whether an entry was removed.
    async fn delete(&self, cache: &str, path: &str) -> Result<bool, WorkerError>;

    /// Paths cached in `cache`.
    async fn keys(&self, cache: &str) -> Result<Vec<String>, WorkerError>;

    /// Remove a whole cache. Returns whether it existed.
    async fn delete_cache(&self, cache: &str) -> Result<bool, WorkerError>;
}

/// In-memory [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, BTreeMap<String, Response>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn cache_names(&self) -> Result<Vec<String>, WorkerError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn match_any(&self, path: &str) -> Result<Option<Response>, WorkerError> {
        Ok(self
            .caches
            .read()
            .await
            .values()
            .find_map(|cache| cache.get(path).cloned()))
    }

    async fn put(&self, cache: &str, path: &str, response: Response) -> Result<(), WorkerError> {
        self.caches
            .write()
            .await
            .entry(cache.to_string())
            .or_default()
            .insert(path.to_string(), response);
        Ok(())
    }

    async fn delete(&self, cache: &str, path: &str) -> Result<bool, WorkerError> {
        Ok(self
            .caches
            .write()
            .await
            .get_mut(cache)
            .and_then(|entries| entries.remove(path))
            .is_some())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>, WorkerError> {
        Ok(self
            .caches
            .read()
            .await
            .get(cache)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool, WorkerError> {
        Ok(self.caches.write().await.remove(cache).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_match_searches_all_caches() {
        let storage = MemoryCacheStorage::new();
        storage.put("OLD", "/a", Response::ok("old")).await.unwrap();
        storage.put("NEW", "/b", Response::ok("new")).await.unwrap();
        assert_eq!(storage.match_any("/a").await.unwrap(), Some(Response::ok("old")));
        assert_eq!(storage.match_any("/b").await.unwrap(), Some(Response::ok("new")));
        assert_eq!(storage.match_any("/c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_and_keys() {
        let storage = MemoryCacheStorage::new();
        storage.put("C", "/a", Response::ok("1")).await.unwrap();
        storage.put("C", "/b", Response::ok("2")).await.unwrap();
        assert!(storage.delete("C", "/a").await.unwrap());
        assert!(!storage.delete("C", "/a").await.unwrap());
        assert!(!storage.delete("missing", "/a").await.unwrap());
        assert_eq!(storage.keys("C").await.unwrap(), vec!["/b".to_string()]);
        assert!(storage.keys("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cache() {
        let storage = MemoryCacheStorage::new();
        storage.put("C", "/a", Response::ok("1")).await.unwrap();
        assert_eq!(storage.cache_names().await.unwrap(), vec!["C".to_string()]);
        assert!(storage.delete_cache("C").await.unwrap());
        assert!(storage.cache_names().await.unwrap().is_empty());
        assert_eq!(storage.match_any("/a").await.unwrap(), None);
    }
}
