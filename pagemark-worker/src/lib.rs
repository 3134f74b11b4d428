//! Pagemark Worker - Offline Cache Policy Engine
//!
//! The background worker sits between the reader and the network:
//! - [`routes`]: ordered route table and caching directives
//! - [`engine`]: per-directive fetch handling, install and purge
//! - [`control`]: control messages (version, purge, list, delete)
//! - [`host`]: worker lifecycle and message loop
//! - [`channel`]: page-side request/response channel with timeouts

pub mod cache;
pub mod channel;
pub mod control;
pub mod engine;
pub mod host;
pub mod http;
pub mod routes;

pub use cache::{CacheStorage, MemoryCacheStorage};
pub use channel::WorkerChannel;
pub use control::{pong, ControlMessage, Envelope, FAILURE, SUCCESS};
pub use engine::{CachePolicyEngine, EngineConfig};
pub use host::{spawn_worker, WorkerRegistration, WorkerState};
pub use http::{Fetcher, HttpFetcher, Request, Response};
pub use routes::{Directive, Fallback, Route, RouteMatcher, RouteTable};

// ============================================================================
// VERSIONING
// ============================================================================

/// Reported by `GET_SW_VERSION`.
pub const SW_VERSION: u64 = 1;

/// Cache that precached assets and refreshed responses are written to.
pub const CACHE_NAME: &str = "OFFLINE_V1";

/// Fetched and cached when the worker installs.
pub const PRECACHE_ASSETS: &[&str] = &[
    "/local",
    "/reader",
    "/assets/local/index.js",
    "/assets/reader/index.js",
    "/assets/images/no-cover.jpg",
    "/assets/reader/readerThemes.css",
    "/manifest.json",
    "/assets/index.js",
    "/assets/style.css",
    "/assets/common.js",
    "/assets/lib/platform.min.js",
    "/assets/lib/jszip.min.js",
    "/assets/lib/epub.min.js",
    "/assets/lib/no-sleep.min.js",
    "/assets/lib/idb-keyval.min.js",
];
