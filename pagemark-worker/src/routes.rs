//! Route table: which caching directive applies to a request path.

use pagemark_core::WorkerError;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::http::Response;

/// How a matched request interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directive {
    /// Serve the cached copy if any; otherwise fetch and cache once.
    CacheOnly,
    /// Always fetch; never cache.
    CacheNever,
    /// Fetch and cache; serve the cached copy only if the fetch fails.
    CacheUpdateSync,
    /// Serve the cached copy if any and refresh it in the background;
    /// otherwise wait for the fetch.
    CacheUpdateAsync,
}

#[derive(Debug, Clone)]
pub enum RouteMatcher {
    Exact(String),
    Pattern(Regex),
    Any,
}

impl RouteMatcher {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, WorkerError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| WorkerError::InvalidRoute {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == path,
            Self::Pattern(re) => re.is_match(path),
            Self::Any => true,
        }
    }
}

/// What to answer when the network fails and the directive has nothing
/// better to offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Answer with whatever is cached under this path.
    CacheMatch(String),
    /// Answer with a fixed response.
    Static(Response),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub matcher: RouteMatcher,
    pub directive: Directive,
    pub fallback: Option<Fallback>,
}

impl Route {
    pub fn new(matcher: RouteMatcher, directive: Directive) -> Self {
        Self {
            matcher,
            directive,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Ordered routes; the first match wins.
///
/// The table always ends with a catch-all [`Directive::CacheNever`] route,
/// so every path classifies.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(mut routes: Vec<Route>, catch_all_fallback: Option<Fallback>) -> Self {
        routes.push(Route {
            matcher: RouteMatcher::Any,
            directive: Directive::CacheNever,
            fallback: catch_all_fallback,
        });
        Self { routes }
    }

    /// Routes of the reader application.
    pub fn default_routes() -> Result<Self, WorkerError> {
        use Directive::*;
        let routes = vec![
            Route::new(RouteMatcher::exact("/local"), CacheUpdateAsync),
            Route::new(RouteMatcher::exact("/reader"), CacheUpdateAsync),
            Route::new(RouteMatcher::exact("/manifest.json"), CacheUpdateAsync),
            Route::new(RouteMatcher::pattern(r"^/assets/")?, CacheUpdateAsync),
            Route::new(
                RouteMatcher::pattern(r"^/documents/[a-zA-Z0-9]{32}/(cover|file)$")?,
                CacheUpdateAsync,
            ),
            Route::new(
                RouteMatcher::pattern(r"^/documents/[a-zA-Z0-9]{32}/progress$")?,
                CacheUpdateSync,
            ),
        ];
        Ok(Self::new(
            routes,
            Some(Fallback::CacheMatch("/local".to_string())),
        ))
    }

    pub fn classify(&self, path: &str) -> &Route {
        // The catch-all guarantees a match; the last route is it.
        self.routes
            .iter()
            .find(|route| route.matcher.matches(path))
            .unwrap_or(&self.routes[self.routes.len() - 1])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
