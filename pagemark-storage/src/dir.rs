//! Directory-backed key-value store.
//!
//! Each key is one file under the store root. File names are the
//! hex-encoded key so arbitrary key text is safe on every filesystem.
//! Writes go to a temporary sibling and are renamed into place.
//!
//! Hex doubles the key length and file names are limited to 255 bytes, so
//! keys are limited to [`MAX_KEY_LEN`] bytes. Writing a longer key fails
//! with [`StoreError::KeyTooLong`]; reading or deleting one finds nothing.

use async_trait::async_trait;
use pagemark_core::StoreError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::traits::{Change, KeyValueStore, StoreResult};

const VALUE_EXT: &str = "val";
const TEMP_EXT: &str = "tmp";

/// Longest key, in bytes, whose file name fits in 255 bytes.
pub const MAX_KEY_LEN: usize = (255 - 1 - VALUE_EXT.len()) / 2;

/// A durable [`KeyValueStore`] rooted at a directory.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    /// Serializes writers so `set_raw` reports the value it replaced.
    write_lock: Mutex<()>,
}

impl DirStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| io_error(&root, e))?;
        debug!(root = %root.display(), "Opened directory store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key.as_bytes()), VALUE_EXT))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key.as_bytes()), TEMP_EXT))
    }

    async fn read_value(&self, path: &Path) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }

    /// Decode a value file name back into its key.
    ///
    /// Temporary files and foreign files are ignored.
    fn key_of(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != VALUE_EXT {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn value_files(&self) -> StoreResult<Vec<(String, PathBuf)>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;
        let mut out = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(&self.root, e))? {
            let path = entry.path();
            match Self::key_of(&path) {
                Some(key) => out.push((key, path)),
                None => {
                    if path.extension().and_then(|e| e.to_str()) != Some(TEMP_EXT) {
                        warn!(path = %path.display(), "Ignoring unrecognized file in store");
                    }
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[async_trait]
impl KeyValueStore for DirStore {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if key.len() > MAX_KEY_LEN {
            return Ok(None);
        }
        self.read_value(&self.value_path(key)).await
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>) -> StoreResult<Change<Vec<u8>>> {
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        let _guard = self.write_lock.lock().await;
        let path = self.value_path(key);
        let old_value = self.read_value(&path).await?;

        let temp = self.temp_path(key);
        tokio::fs::write(&temp, &value)
            .await
            .map_err(|e| io_error(&temp, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(Change {
            old_value,
            new_value: value,
        })
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        if key.len() > MAX_KEY_LEN {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let path = self.value_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .value_files()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for (key, path) in self.value_files().await? {
            // A concurrent delete between listing and reading drops the entry.
            if let Some(bytes) = self.read_value(&path).await? {
                out.push((key, bytes));
            }
        }
        Ok(out)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        reason: format!("{}: {}", path.display(), e),
    }
}
