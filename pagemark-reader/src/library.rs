//! Device settings and the offline library.

use pagemark_core::{progress_key, BookState, PagemarkResult, ProgressEvent, ReaderSettings, SETTINGS_KEY};
use pagemark_storage::{KeyValueStore, KeyValueStoreExt, StoreResult};
use pagemark_worker::WorkerChannel;
use tracing::{info, warn};

/// Load reader settings, generating a device identity on first use.
pub async fn load_settings<S>(store: &S, default_device_name: &str) -> StoreResult<ReaderSettings>
where
    S: KeyValueStore + ?Sized,
{
    let mut settings: ReaderSettings = store
        .get_json_or(SETTINGS_KEY, ReaderSettings::default())
        .await?;
    if settings.ensure_device(default_device_name) {
        info!(device_id = %settings.device_id, device = %settings.device_name, "Registered device");
        store.set_json(SETTINGS_KEY, &settings).await?;
    }
    Ok(settings)
}

pub async fn save_settings<S>(store: &S, settings: &ReaderSettings) -> StoreResult<()>
where
    S: KeyValueStore + ?Sized,
{
    store.set_json(SETTINGS_KEY, settings).await?;
    Ok(())
}

/// Documents available offline, with any locally queued progress taking
/// precedence over the cached copy.
pub async fn cached_library<S>(channel: &WorkerChannel, store: &S) -> PagemarkResult<Vec<BookState>>
where
    S: KeyValueStore + ?Sized,
{
    let documents = channel.cached_documents().await?;
    let mut library = Vec::with_capacity(documents.len());
    for document in documents {
        let mut book: BookState = match serde_json::from_value(document) {
            Ok(book) => book,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable cached document");
                continue;
            }
        };
        if let Some(queued) = store.get_json::<ProgressEvent>(&progress_key(&book.id)).await? {
            book.position = queued.progress;
            book.percentage = (queued.percentage * 10_000.0).round() / 100.0;
        }
        library.push(book);
    }
    Ok(library)
}
