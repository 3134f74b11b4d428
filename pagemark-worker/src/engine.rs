//! Cache policy engine.
//!
//! Every GET passing through the worker is classified by the route table
//! and served according to its [`Directive`]. Other methods go straight to
//! the network. Only network failures (not HTTP error statuses) trigger
//! cache or fallback answers, and only successful responses are cached.

use pagemark_core::WorkerError;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::http::{Fetcher, Request, Response};
use crate::routes::{Directive, Fallback, Route, RouteTable};
use crate::{CACHE_NAME, PRECACHE_ASSETS};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cache that fetched responses are written to.
    pub cache_name: String,
    /// Paths fetched and cached on install.
    pub precache: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            precache: PRECACHE_ASSETS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn with_precache(mut self, paths: Vec<String>) -> Self {
        self.precache = paths;
        self
    }
}

/// Route-driven caching in front of a [`Fetcher`].
pub struct CachePolicyEngine<F, C>
where
    F: Fetcher,
    C: CacheStorage,
{
    pub(crate) fetcher: Arc<F>,
    pub(crate) cache: Arc<C>,
    routes: Arc<RouteTable>,
    pub(crate) config: EngineConfig,
}

impl<F, C> Clone for CachePolicyEngine<F, C>
where
    F: Fetcher,
    C: CacheStorage,
{
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            routes: Arc::clone(&self.routes),
            config: self.config.clone(),
        }
    }
}

impl<F, C> CachePolicyEngine<F, C>
where
    F: Fetcher + 'static,
    C: CacheStorage + 'static,
{
    pub fn new(fetcher: Arc<F>, cache: Arc<C>, routes: RouteTable, config: EngineConfig) -> Self {
        Self {
            fetcher,
            cache,
            routes: Arc::new(routes),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, WorkerError> {
        if request.method != Method::GET {
            return self.fetcher.fetch(&request).await;
        }

        let route = self.routes.classify(&request.path);
        debug!(path = %request.path, directive = ?route.directive, "Handling fetch");
        let current = self.cached(&request.path).await;

        match route.directive {
            Directive::CacheNever => match self.fetcher.fetch(&request).await {
                Ok(response) => Ok(response),
                Err(e) => self.fallback(route, &request.path, e).await,
            },
            Directive::CacheOnly => match current {
                Some(cached) => Ok(cached),
                None => match self.update_cache(&request).await {
                    Ok(response) => Ok(response),
                    Err(e) => self.fallback(route, &request.path, e).await,
                },
            },
            Directive::CacheUpdateSync => match self.update_cache(&request).await {
                Ok(response) => Ok(response),
                Err(e) => match current {
                    Some(cached) => Ok(cached),
                    None => self.fallback(route, &request.path, e).await,
                },
            },
            Directive::CacheUpdateAsync => match current {
                Some(cached) => {
                    self.spawn_refresh(request);
                    Ok(cached)
                }
                None => match self.update_cache(&request).await {
                    Ok(response) => Ok(response),
                    Err(e) => self.fallback(route, &request.path, e).await,
                },
            },
        }
    }

    /// Fetch `request` and cache the response if it succeeded.
    pub async fn update_cache(&self, request: &Request) -> Result<Response, WorkerError> {
        let response = self.fetcher.fetch(request).await.map_err(|e| {
            debug!(path = %request.path, error = %e, "Cache update fetch failed");
            e
        })?;
        if response.is_success() {
            if let Err(e) = self
                .cache
                .put(&self.config.cache_name, &request.path, response.clone())
                .await
            {
                warn!(path = %request.path, error = %e, "Failed to write cache entry");
            }
        }
        Ok(response)
    }

    /// Lookup that treats cache read failures as misses.
    async fn cached(&self, path: &str) -> Option<Response> {
        match self.cache.match_any(path).await {
            Ok(found) => found,
            Err(e) => {
                warn!(path, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    fn spawn_refresh(&self, request: Request) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.update_cache(&request).await {
                debug!(path = %request.path, error = %e, "Background refresh failed");
            }
        });
    }

    async fn fallback(
        &self,
        route: &Route,
        path: &str,
        error: WorkerError,
    ) -> Result<Response, WorkerError> {
        debug!(path, directive = ?route.directive, "Using fallback");
        match &route.fallback {
            None => Err(error),
            Some(Fallback::Static(response)) => Ok(response.clone()),
            Some(Fallback::CacheMatch(fallback_path)) => self
                .cached(fallback_path)
                .await
                .ok_or_else(|| WorkerError::FallbackMiss {
                    path: fallback_path.clone(),
                }),
        }
    }

    /// Fetch every precache asset, then cache them all.
    ///
    /// Nothing is written unless every fetch succeeds.
    pub async fn install(&self) -> Result<(), WorkerError> {
        let mut fetched = Vec::with_capacity(self.config.precache.len());
        for path in &self.config.precache {
            let response = self
                .fetcher
                .fetch(&Request::get(path.clone()))
                .await
                .map_err(|e| WorkerError::InstallFailed {
                    reason: e.to_string(),
                })?;
            if !response.is_success() {
                return Err(WorkerError::InstallFailed {
                    reason: format!("HTTP {} for {}", response.status, path),
                });
            }
            fetched.push((path, response));
        }

        for (path, response) in fetched {
            self.cache
                .put(&self.config.cache_name, path, response)
                .await
                .map_err(|e| WorkerError::InstallFailed {
                    reason: e.to_string(),
                })?;
        }
        info!(
            cache = %self.config.cache_name,
            assets = self.config.precache.len(),
            "Precached assets"
        );
        Ok(())
    }

    /// Delete every cache.
    pub async fn purge(&self) -> Result<(), WorkerError> {
        info!("Purging caches");
        for name in self.cache.cache_names().await? {
            self.cache.delete_cache(&name).await?;
        }
        Ok(())
    }
}
