//! Pagemark Core - Shared Types
//!
//! Data model, persisted key names, error taxonomy and configuration shared
//! by every Pagemark crate. No I/O beyond reading the config file.

pub mod book;
pub mod config;
pub mod error;
pub mod settings;
pub mod words;

pub use book::{ActivityEvent, ActivityRecord, BookState, BookStats, BookType, Device, ProgressEvent};
pub use config::{ActivityLimits, ReaderConfig, CONFIG_ENV};
pub use error::{
    ConfigError, PagemarkError, PagemarkResult, PositionError, StoreError, SyncError, WorkerError,
};
pub use settings::{random_id, ReaderSettings, ThemeSettings, COLOR_SCHEMES};
pub use words::{count_words, percentage, sync_fraction};

// ============================================================================
// PERSISTED KEYS
// ============================================================================

/// Queued activity batch awaiting replay.
pub const ACTIVITY_KEY: &str = "ACTIVITY";

/// Device identity and theme.
pub const SETTINGS_KEY: &str = "readerSettings";

/// Raw book file of a local document.
pub fn file_key(id: &str) -> String {
    format!("FILE-{}", id)
}

/// `BookState` JSON of a local document.
pub fn metadata_key(id: &str) -> String {
    format!("FILE-METADATA-{}", id)
}

/// Queued progress event of a document awaiting replay.
pub fn progress_key(id: &str) -> String {
    format!("PROGRESS-{}", id)
}

/// Document id of a `PROGRESS-{id}` key.
pub fn progress_key_id(key: &str) -> Option<&str> {
    key.strip_prefix("PROGRESS-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(file_key("abc"), "FILE-abc");
        assert_eq!(metadata_key("abc"), "FILE-METADATA-abc");
        assert_eq!(progress_key("abc"), "PROGRESS-abc");
        assert_eq!(progress_key_id("PROGRESS-abc"), Some("abc"));
        assert_eq!(progress_key_id("ACTIVITY"), None);
    }
}
