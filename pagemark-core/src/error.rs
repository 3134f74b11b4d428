//! Error types for Pagemark operations

use thiserror::Error;

/// Key-value store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid key pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode value for {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Key of {len} bytes exceeds the {max}-byte limit")]
    KeyTooLong { len: usize, max: usize },

    #[error("Store I/O failed: {reason}")]
    Io { reason: String },
}

/// Position codec errors.
///
/// Every variant means the same thing to a reader session: start at the
/// beginning of the book.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("Malformed reading position: {position}")]
    Malformed { position: String },

    #[error("Malformed internal location: {location}")]
    MalformedLocation { location: String },

    #[error("Fragment index {index} out of range (spine has {len} documents)")]
    FragmentOutOfRange { index: usize, len: usize },

    #[error("No element matches {selector} in spine document {spine_index}")]
    Unresolved { selector: String, spine_index: usize },

    #[error("Location does not address a node inside the document body")]
    OutsideBody,

    #[error("Failed to parse spine document {href}: {reason}")]
    Parse { href: String, reason: String },
}

/// Background worker, cache engine and channel errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Background worker not supported in this environment")]
    Unsupported,

    #[error("Inactive background worker")]
    Inactive,

    #[error("Worker install failed: {reason}")]
    InstallFailed { reason: String },

    #[error("Fetch failed for {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("No cached response for fallback {path}")]
    FallbackMiss { path: String },

    #[error("Cache storage error: {reason}")]
    Cache { reason: String },

    #[error("Invalid route pattern {pattern:?}: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("Invalid worker message: {reason}")]
    InvalidMessage { reason: String },

    #[error("No response for message {id} within {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("Worker channel closed")]
    ChannelClosed,
}

/// Remote sync errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Transport error on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("HTTP {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl SyncError {
    /// Worth queueing for replay: the request never completed, or the
    /// server failed rather than rejected it.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { .. } => true,
            SyncError::Status { status, .. } => *status >= 500,
            SyncError::InvalidResponse { .. } => false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or PAGEMARK_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all Pagemark errors.
#[derive(Debug, Clone, Error)]
pub enum PagemarkError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rendition error: {reason}")]
    Rendition { reason: String },

    #[error("A page turn is already in progress")]
    TurnInProgress,
}

/// Result type alias for Pagemark operations.
pub type PagemarkResult<T> = Result<T, PagemarkError>;

// =============================================================================
// TESTS
// =============================================================================
