//! Pagemark Reader - Reader Session and Sync
//!
//! Ties the rendition, position codec, key-value store and sync API
//! together for one open book:
//! - [`session`]: page turns, stats and theme changes for an open book
//! - [`progress`]: word offsets, percentages and activity normalization
//! - [`sync`]: remote progress/activity sync with an offline queue
//! - [`library`]: device settings and the offline library
//! - [`rendition`] and [`input`]: the rendering engine seam and input mapping

pub mod clock;
pub mod input;
pub mod library;
pub mod progress;
pub mod rendition;
pub mod session;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use input::{command_for, ReaderCommand};
pub use library::{cached_library, load_settings, save_settings};
pub use progress::{normalize_activity, PageView, ProgressTracker, UNKNOWN_CHAPTER};
pub use rendition::{
    Rendition, RenditionEvent, SectionLayout, SwipeDirection, TapZone, VisibleRange,
};
pub use session::{ReaderSession, SessionServices};
pub use sync::{FlushOutcome, HttpSyncTransport, ReplayReport, SyncClient, SyncTransport};
