//! Pagemark Storage - Key-Value Store Adapter
//!
//! Uniform async get/set/del/keys/find over a durable key-value store.
//! [`DirStore`] persists to a directory; [`MemoryStore`] is for tests and
//! ephemeral sessions.

pub mod dir;
pub mod memory;
pub mod traits;

pub use dir::{DirStore, MAX_KEY_LEN};
pub use memory::MemoryStore;
pub use traits::{compile_pattern, Change, FindResult, KeyValueStore, KeyValueStoreExt, StoreResult};
