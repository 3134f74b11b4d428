//! In-memory key-value store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::traits::{Change, KeyValueStore, StoreResult};

/// A [`KeyValueStore`] held entirely in memory.
///
/// Used by tests and by sessions that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>) -> StoreResult<Change<Vec<u8>>> {
        let mut entries = self.entries.write().await;
        let old_value = entries.insert(key.to_string(), value.clone());
        Ok(Change {
            old_value,
            new_value: value,
        })
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
