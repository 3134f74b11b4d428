//! Cache policy engine behaviour against a scripted network.

use pagemark_core::WorkerError;
use pagemark_test_utils::fixtures::{progress_response, DOCUMENT_ID};
use pagemark_test_utils::MockFetcher;
use pagemark_worker::{
    CachePolicyEngine, CacheStorage, ControlMessage, Directive, EngineConfig, MemoryCacheStorage,
    Request, Response, Route, RouteMatcher, RouteTable, CACHE_NAME, SUCCESS, SW_VERSION,
};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

type Engine = CachePolicyEngine<MockFetcher, MemoryCacheStorage>;

const OTHER_ID: &str = "fedcba9876543210fedcba9876543210";

fn engine_with_routes(routes: RouteTable) -> (Engine, Arc<MockFetcher>, Arc<MemoryCacheStorage>) {
    let fetcher = Arc::new(MockFetcher::new());
    let cache = Arc::new(MemoryCacheStorage::new());
    let config = EngineConfig::new().with_precache(vec!["/local".to_string(), "/reader".to_string()]);
    let engine = CachePolicyEngine::new(Arc::clone(&fetcher), Arc::clone(&cache), routes, config);
    (engine, fetcher, cache)
}

fn engine() -> (Engine, Arc<MockFetcher>, Arc<MemoryCacheStorage>) {
    engine_with_routes(RouteTable::default_routes().unwrap())
}

fn body(response: &Response) -> &str {
    std::str::from_utf8(&response.body).unwrap()
}

// ============================================================================
// DIRECTIVES
// ============================================================================

#[tokio::test]
async fn test_update_async_serves_cache_when_offline() {
    let (engine, fetcher, cache) = engine();
    cache
        .put(CACHE_NAME, "/assets/style.css", Response::ok("cached"))
        .await
        .unwrap();
    fetcher.set_offline(true);

    let response = engine.handle_fetch(Request::get("/assets/style.css")).await.unwrap();
    assert_eq!(body(&response), "cached");
}

#[tokio::test]
async fn test_update_async_refreshes_in_background() {
    let (engine, fetcher, cache) = engine();
    cache
        .put(CACHE_NAME, "/assets/style.css", Response::ok("old"))
        .await
        .unwrap();
    fetcher.set_response("/assets/style.css", Response::ok("new"));

    let response = engine.handle_fetch(Request::get("/assets/style.css")).await.unwrap();
    assert_eq!(body(&response), "old");

    let mut refreshed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let current = cache.match_any("/assets/style.css").await.unwrap().unwrap();
        if body(&current) == "new" {
            refreshed = true;
            break;
        }
    }
    assert!(refreshed, "background refresh never landed");
}

#[tokio::test]
async fn test_update_async_miss_waits_for_network() {
    let (engine, fetcher, cache) = engine();
    fetcher.set_response("/manifest.json", Response::ok("{}"));

    let response = engine.handle_fetch(Request::get("/manifest.json")).await.unwrap();
    assert_eq!(body(&response), "{}");
    assert!(cache.match_any("/manifest.json").await.unwrap().is_some());
}

#[tokio::test]
async fn test_never_without_fallback_propagates_failure() {
    let (engine, fetcher, _cache) = engine_with_routes(RouteTable::new(Vec::new(), None));
    fetcher.set_offline(true);

    let result = engine.handle_fetch(Request::get("/api/ko/activity")).await;
    assert!(matches!(result, Err(WorkerError::Fetch { .. })));
}

#[tokio::test]
async fn test_never_falls_back_to_cached_shell() {
    let (engine, fetcher, cache) = engine();
    cache.put(CACHE_NAME, "/local", Response::ok("shell")).await.unwrap();
    fetcher.set_offline(true);

    let response = engine.handle_fetch(Request::get("/documents")).await.unwrap();
    assert_eq!(body(&response), "shell");
}

#[tokio::test]
async fn test_never_fallback_miss() {
    let (engine, fetcher, _cache) = engine();
    fetcher.set_offline(true);

    let result = engine.handle_fetch(Request::get("/documents")).await;
    assert_eq!(
        result,
        Err(WorkerError::FallbackMiss {
            path: "/local".to_string()
        })
    );
}

#[tokio::test]
async fn test_never_does_not_cache() {
    let (engine, fetcher, cache) = engine();
    fetcher.set_response("/api/info", Response::ok("live"));

    engine.handle_fetch(Request::get("/api/info")).await.unwrap();
    assert!(cache.match_any("/api/info").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_sync_prefers_network() {
    let (engine, fetcher, cache) = engine();
    let path = format!("/documents/{}/progress", DOCUMENT_ID);
    cache.put(CACHE_NAME, &path, Response::ok("stale")).await.unwrap();
    fetcher.set_response(path.clone(), Response::ok("fresh"));

    let response = engine.handle_fetch(Request::get(path.clone())).await.unwrap();
    assert_eq!(body(&response), "fresh");
    let cached = cache.match_any(&path).await.unwrap().unwrap();
    assert_eq!(body(&cached), "fresh");
}

#[tokio::test]
async fn test_update_sync_falls_back_to_cache() {
    let (engine, fetcher, cache) = engine();
    let path = format!("/documents/{}/progress", DOCUMENT_ID);
    cache.put(CACHE_NAME, &path, Response::ok("stale")).await.unwrap();
    fetcher.set_offline(true);

    let response = engine.handle_fetch(Request::get(path)).await.unwrap();
    assert_eq!(body(&response), "stale");
}

#[tokio::test]
async fn test_cache_only_never_refreshes() {
    let routes = RouteTable::new(
        vec![Route::new(RouteMatcher::exact("/fonts/serif.woff"), Directive::CacheOnly)],
        None,
    );
    let (engine, fetcher, cache) = engine_with_routes(routes);
    cache
        .put(CACHE_NAME, "/fonts/serif.woff", Response::ok("font"))
        .await
        .unwrap();
    fetcher.set_response("/fonts/serif.woff", Response::ok("newer font"));

    let response = engine.handle_fetch(Request::get("/fonts/serif.woff")).await.unwrap();
    assert_eq!(body(&response), "font");
    assert_eq!(fetcher.request_count("/fonts/serif.woff"), 0);
}

#[tokio::test]
async fn test_cache_only_fetches_once_on_miss() {
    let routes = RouteTable::new(
        vec![Route::new(RouteMatcher::exact("/fonts/serif.woff"), Directive::CacheOnly)],
        None,
    );
    let (engine, fetcher, _cache) = engine_with_routes(routes);
    fetcher.set_response("/fonts/serif.woff", Response::ok("font"));

    engine.handle_fetch(Request::get("/fonts/serif.woff")).await.unwrap();
    engine.handle_fetch(Request::get("/fonts/serif.woff")).await.unwrap();
    assert_eq!(fetcher.request_count("/fonts/serif.woff"), 1);
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let (engine, fetcher, cache) = engine();
    fetcher.set_response("/assets/missing.js", Response::new(500, "boom"));

    let response = engine.handle_fetch(Request::get("/assets/missing.js")).await.unwrap();
    assert_eq!(response.status, 500);
    assert!(cache.match_any("/assets/missing.js").await.unwrap().is_none());
}

#[tokio::test]
async fn test_non_get_bypasses_cache() {
    let (engine, fetcher, cache) = engine();
    let path = format!("/documents/{}/progress", DOCUMENT_ID);
    fetcher.set_response(path.clone(), Response::ok("stored"));

    let request = Request::new(Method::PUT, path.clone()).with_body(b"{}".to_vec());
    engine.handle_fetch(request).await.unwrap();
    assert!(cache.match_any(&path).await.unwrap().is_none());
    assert_eq!(fetcher.requests()[0].method, Method::PUT);
}

// ============================================================================
// INSTALL
// ============================================================================

#[tokio::test]
async fn test_install_caches_every_asset() {
    let (engine, fetcher, cache) = engine();
    fetcher.set_response("/local", Response::ok("local"));
    fetcher.set_response("/reader", Response::ok("reader"));

    engine.install().await.unwrap();
    let mut keys = cache.keys(CACHE_NAME).await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["/local".to_string(), "/reader".to_string()]);
}

#[tokio::test]
async fn test_install_failure_writes_nothing() {
    let (engine, fetcher, cache) = engine();
    fetcher.set_response("/local", Response::ok("local"));
    fetcher.fail_path("/reader");

    let result = engine.install().await;
    assert!(matches!(result, Err(WorkerError::InstallFailed { .. })));
    assert!(cache.keys(CACHE_NAME).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_install_rejects_error_status() {
    let (engine, fetcher, cache) = engine();
    fetcher.set_response("/local", Response::ok("local"));

    // "/reader" is unscripted and answers 404
    let result = engine.install().await;
    assert!(matches!(result, Err(WorkerError::InstallFailed { .. })));
    assert!(cache.cache_names().await.unwrap().is_empty());
}

// ============================================================================
// CONTROL MESSAGES
// ============================================================================

async fn cache_document(cache: &MemoryCacheStorage, id: &str, with_progress: bool) {
    cache
        .put(CACHE_NAME, &format!("/documents/{}/file", id), Response::ok("epub"))
        .await
        .unwrap();
    if with_progress {
        cache
            .put(
                CACHE_NAME,
                &format!("/documents/{}/progress", id),
                progress_response(id, 12.5),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_version_message() {
    let (engine, _fetcher, _cache) = engine();
    let reply = engine.handle_message(ControlMessage::GetSwVersion).await;
    assert_eq!(reply, json!(SW_VERSION));
}

#[tokio::test]
async fn test_unknown_message_echoes_pong() {
    let (engine, _fetcher, _cache) = engine();
    let reply = engine
        .handle_message(ControlMessage::from_data(json!({"type": "HELLO"})))
        .await;
    assert_eq!(reply, json!({"pong": 1}));
}

#[tokio::test]
async fn test_cached_documents_require_file_and_progress() {
    let (engine, fetcher, cache) = engine();
    cache_document(&cache, DOCUMENT_ID, true).await;
    cache_document(&cache, OTHER_ID, false).await;
    fetcher.set_offline(true);

    let reply = engine.handle_message(ControlMessage::GetSwCache).await;
    let documents = reply.as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["id"], DOCUMENT_ID);
    assert_eq!(documents[0]["percentage"], 12.5);
}

#[tokio::test]
async fn test_cached_documents_refresh_progress() {
    let (engine, fetcher, cache) = engine();
    cache_document(&cache, DOCUMENT_ID, true).await;
    let path = format!("/documents/{}/progress", DOCUMENT_ID);
    fetcher.set_response(path.clone(), progress_response(DOCUMENT_ID, 40.0));

    let documents = engine.cached_documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["percentage"], 40.0);
    let cached: Value = cache.match_any(&path).await.unwrap().unwrap().json().unwrap();
    assert_eq!(cached["percentage"], 40.0);
}

#[tokio::test]
async fn test_delete_cached_document() {
    let (engine, _fetcher, cache) = engine();
    cache_document(&cache, DOCUMENT_ID, true).await;

    let reply = engine
        .handle_message(ControlMessage::DelSwCache {
            id: DOCUMENT_ID.to_string(),
        })
        .await;
    assert_eq!(reply, json!(SUCCESS));
    assert!(cache.keys(CACHE_NAME).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_removes_every_cache() {
    let (engine, _fetcher, cache) = engine();
    cache.put(CACHE_NAME, "/local", Response::ok("local")).await.unwrap();
    cache.put("OFFLINE_V0", "/local", Response::ok("older")).await.unwrap();

    let reply = engine.handle_message(ControlMessage::PurgeSwCache).await;
    assert_eq!(reply, json!(SUCCESS));
    assert!(cache.cache_names().await.unwrap().is_empty());
}
