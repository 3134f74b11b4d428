//! Device settings and the offline library.

use pagemark_core::{progress_key, ProgressEvent, ReaderSettings, ThemeSettings, SETTINGS_KEY};
use pagemark_reader::{cached_library, load_settings, save_settings};
use pagemark_storage::KeyValueStoreExt;
use pagemark_test_utils::fixtures::{progress_response, settings, DOCUMENT_ID};
use pagemark_test_utils::{MemoryStore, MockFetcher};
use pagemark_worker::{
    spawn_worker, CachePolicyEngine, CacheStorage, EngineConfig, MemoryCacheStorage, Response,
    RouteTable, WorkerChannel, CACHE_NAME,
};
use std::sync::Arc;
use std::time::Duration;

const OTHER_ID: &str = "fedcba9876543210fedcba9876543210";

// ============================================================================
// SETTINGS
// ============================================================================

#[tokio::test]
async fn test_first_load_registers_device() {
    let store = MemoryStore::new();
    let loaded = load_settings(&store, "Linux - Firefox").await.unwrap();

    assert_eq!(loaded.device_id.len(), 32);
    assert_eq!(loaded.device_name, "Linux - Firefox");
    assert_eq!(loaded.theme.color_scheme(), "tan");

    let saved: ReaderSettings = store.get_json(SETTINGS_KEY).await.unwrap().unwrap();
    assert_eq!(saved, loaded);

    // The identity is stable across loads.
    let again = load_settings(&store, "Other Browser").await.unwrap();
    assert_eq!(again, loaded);
}

#[tokio::test]
async fn test_saved_settings_round_trip() {
    let store = MemoryStore::new();
    let mut custom = settings();
    custom.theme = ThemeSettings {
        color_scheme: Some("black".to_string()),
        font_family: Some("sans-serif".to_string()),
        font_size: Some(1.2),
    };
    save_settings(&store, &custom).await.unwrap();

    let loaded = load_settings(&store, "Linux - Firefox").await.unwrap();
    assert_eq!(loaded, custom);
}

#[tokio::test]
async fn test_missing_device_name_is_filled_in() {
    let store = MemoryStore::new();
    store
        .set_json(
            SETTINGS_KEY,
            &ReaderSettings {
                device_id: "0123456789ABCDEF0123456789ABCDEF".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let loaded = load_settings(&store, "Linux - Firefox").await.unwrap();
    assert_eq!(loaded.device_id, "0123456789ABCDEF0123456789ABCDEF");
    assert_eq!(loaded.device_name, "Linux - Firefox");
}

// ============================================================================
// OFFLINE LIBRARY
// ============================================================================

async fn library_worker() -> (WorkerChannel, Arc<MemoryCacheStorage>) {
    let fetcher = MockFetcher::new().with_response("/local", Response::ok("shell"));
    let cache = Arc::new(MemoryCacheStorage::new());
    let engine = CachePolicyEngine::new(
        Arc::new(fetcher),
        Arc::clone(&cache),
        RouteTable::default_routes().unwrap(),
        EngineConfig::new().with_precache(vec!["/local".to_string()]),
    );
    let channel = WorkerChannel::new(Some(spawn_worker(engine)), Duration::from_secs(2));
    channel.install().await.unwrap();

    for (id, percentage) in [(DOCUMENT_ID, 12.5), (OTHER_ID, 80.0)] {
        cache
            .put(CACHE_NAME, &format!("/documents/{}/file", id), Response::ok("epub"))
            .await
            .unwrap();
        cache
            .put(
                CACHE_NAME,
                &format!("/documents/{}/progress", id),
                progress_response(id, percentage),
            )
            .await
            .unwrap();
    }
    (channel, cache)
}

#[tokio::test]
async fn test_cached_library_prefers_queued_progress() {
    let (channel, _cache) = library_worker().await;
    let store = MemoryStore::new();
    store
        .set_json(
            &progress_key(DOCUMENT_ID),
            &ProgressEvent {
                document: DOCUMENT_ID.to_string(),
                device_id: "DEVICE".to_string(),
                device: "Test Device".to_string(),
                percentage: 0.4,
                progress: "/body/DocFragment[1]/body/p[2]".to_string(),
            },
        )
        .await
        .unwrap();

    let mut library = cached_library(&channel, &store).await.unwrap();
    library.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(library.len(), 2);

    assert_eq!(library[0].id, DOCUMENT_ID);
    assert_eq!(library[0].percentage, 40.0);
    assert_eq!(library[0].position, "/body/DocFragment[1]/body/p[2]");

    assert_eq!(library[1].id, OTHER_ID);
    assert_eq!(library[1].percentage, 80.0);
    assert_eq!(library[1].position, "");
}

#[tokio::test]
async fn test_cached_library_skips_unreadable_documents() {
    let (channel, cache) = library_worker().await;
    cache
        .put(
            CACHE_NAME,
            &format!("/documents/{}/progress", OTHER_ID),
            Response::ok("[1, 2, 3]"),
        )
        .await
        .unwrap();

    let library = cached_library(&channel, &MemoryStore::new()).await.unwrap();
    assert_eq!(library.len(), 1);
    assert_eq!(library[0].id, DOCUMENT_ID);
}

#[tokio::test]
async fn test_cached_library_keeps_documents_with_null_metadata() {
    let (channel, cache) = library_worker().await;
    let body = format!(
        r#"{{"id":"{}","title":null,"author":null,"words":null,"progress":"","percentage":0}}"#,
        OTHER_ID
    );
    cache
        .put(
            CACHE_NAME,
            &format!("/documents/{}/progress", OTHER_ID),
            Response::ok(body).with_header("Content-Type", "application/json"),
        )
        .await
        .unwrap();

    let mut library = cached_library(&channel, &MemoryStore::new()).await.unwrap();
    library.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(library.len(), 2);
    assert_eq!(library[1].id, OTHER_ID);
    assert_eq!(library[1].title, "");
    assert_eq!(library[1].total_words, 0);
}

#[tokio::test]
async fn test_cached_library_needs_a_worker() {
    let channel = WorkerChannel::new(None, Duration::from_secs(2));
    let result = cached_library(&channel, &MemoryStore::new()).await;
    assert!(result.is_err());
}
