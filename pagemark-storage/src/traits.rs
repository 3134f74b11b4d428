//! Key-value store trait and typed helpers.
//!
//! Stores hold opaque byte values under string keys. Structured values
//! (book metadata, queued sync events, settings) are JSON-encoded through
//! [`KeyValueStoreExt`]; book files are stored as raw bytes.

use async_trait::async_trait;
use pagemark_core::StoreError;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a `set`: the value it replaced, if any, and the value written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    pub old_value: Option<T>,
    pub new_value: T,
}

impl<T> Change<T> {
    /// True when the key had no value before this write.
    pub fn is_first_write(&self) -> bool {
        self.old_value.is_none()
    }
}

/// Result of [`KeyValueStore::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindResult {
    /// Matching keys, sorted.
    Keys(Vec<String>),
    /// Matching keys mapped to their values.
    Entries(BTreeMap<String, Vec<u8>>),
}

impl FindResult {
    pub fn keys(&self) -> Vec<&str> {
        match self {
            FindResult::Keys(keys) => keys.iter().map(String::as_str).collect(),
            FindResult::Entries(entries) => entries.keys().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FindResult::Keys(keys) => keys.is_empty(),
            FindResult::Entries(entries) => entries.is_empty(),
        }
    }
}

/// Durable key-value persistence.
///
/// Implementations must make `set_raw` atomic with respect to other writers
/// so the returned `old_value` is exactly the value that was replaced.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`.
    async fn get_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, returning the replaced value.
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> StoreResult<Change<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// All keys currently stored.
    async fn keys(&self) -> StoreResult<Vec<String>>;

    /// All key/value pairs currently stored.
    async fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Keys matching `pattern`, or matching key/value pairs when
    /// `include_values` is set.
    async fn find(&self, pattern: &Regex, include_values: bool) -> StoreResult<FindResult> {
        if !include_values {
            let mut keys: Vec<String> = self
                .keys()
                .await?
                .into_iter()
                .filter(|key| pattern.is_match(key))
                .collect();
            keys.sort();
            return Ok(FindResult::Keys(keys));
        }

        let entries = self
            .entries()
            .await?
            .into_iter()
            .filter(|(key, _)| pattern.is_match(key))
            .collect();
        Ok(FindResult::Entries(entries))
    }
}

/// Compile a key pattern, failing before any store access.
pub fn compile_pattern(pattern: &str) -> StoreResult<Regex> {
    Regex::new(pattern).map_err(|e| StoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// JSON helpers available on every [`KeyValueStore`].
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Get and decode a JSON value.
    async fn get_json<T>(&self, key: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Get and decode a JSON value, or `default` when absent.
    async fn get_json_or<T>(&self, key: &str, default: T) -> StoreResult<T>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self.get_json(key).await?.unwrap_or(default))
    }

    /// Encode and store a JSON value.
    ///
    /// A previous value that no longer decodes as `T` is reported as absent.
    async fn set_json<T>(&self, key: &str, value: &T) -> StoreResult<Change<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let change = self.set_raw(key, bytes).await?;
        Ok(Change {
            old_value: change
                .old_value
                .and_then(|old| serde_json::from_slice(&old).ok()),
            new_value: value.clone(),
        })
    }

    /// Decoded values of every key matching `pattern`.
    async fn find_json<T>(&self, pattern: &Regex) -> StoreResult<BTreeMap<String, T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut out = BTreeMap::new();
        if let FindResult::Entries(entries) = self.find(pattern, true).await? {
            for (key, bytes) in entries {
                let value = decode(&key, &bytes)?;
                out.insert(key, value);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
