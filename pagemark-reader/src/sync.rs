//! Remote sync with an offline queue.
//!
//! Progress and activity are pushed to the sync API as they happen. When a
//! push fails transiently the payload is queued in the key-value store:
//! progress under `PROGRESS-{id}` (latest wins), activity appended to the
//! single `ACTIVITY` batch. [`SyncClient::replay`] drains the queue once
//! the network is back.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pagemark_core::{
    progress_key, progress_key_id, ActivityEvent, BookState, Device, ProgressEvent, ReaderConfig,
    StoreError, SyncError, ACTIVITY_KEY,
};
use pagemark_storage::{FindResult, KeyValueStore, KeyValueStoreExt, StoreResult};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

static PROGRESS_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PROGRESS-").expect("Invalid progress key regex"));

// ============================================================================
// TRANSPORT
// ============================================================================

/// The remote sync API.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn put_progress(&self, event: &ProgressEvent) -> Result<(), SyncError>;

    async fn post_activity(&self, event: &ActivityEvent) -> Result<(), SyncError>;

    /// `GET /reader/progress/{id}`.
    async fn document_progress(&self, id: &str) -> Result<BookState, SyncError>;

    /// `GET /reader/devices`.
    async fn devices(&self) -> Result<Vec<Device>, SyncError>;
}

/// [`SyncTransport`] over HTTP.
#[derive(Clone)]
pub struct HttpSyncTransport {
    client: reqwest::Client,
    base_url: String,
    progress_endpoint: String,
    activity_endpoint: String,
}

impl HttpSyncTransport {
    pub fn new(config: &ReaderConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Transport {
                endpoint: config.api_base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            progress_endpoint: config.progress_endpoint.clone(),
            activity_endpoint: config.activity_endpoint.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SyncError> {
        let response = request.send().await.map_err(|e| SyncError::Transport {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, SyncError> {
        let response = self.send(endpoint, self.client.get(self.url(endpoint))).await?;
        response.json().await.map_err(|e| SyncError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn put_progress(&self, event: &ProgressEvent) -> Result<(), SyncError> {
        let endpoint = &self.progress_endpoint;
        let request = self.client.put(self.url(endpoint)).json(event);
        let response = self.send(endpoint, request).await?;
        debug!(document = %event.document, status = %response.status(), "Flushed progress");
        Ok(())
    }

    async fn post_activity(&self, event: &ActivityEvent) -> Result<(), SyncError> {
        let endpoint = &self.activity_endpoint;
        let request = self.client.post(self.url(endpoint)).json(event);
        let response = self.send(endpoint, request).await?;
        debug!(records = event.activity.len(), status = %response.status(), "Flushed activity");
        Ok(())
    }

    async fn document_progress(&self, id: &str) -> Result<BookState, SyncError> {
        self.get_json(&format!("/reader/progress/{}", id)).await
    }

    async fn devices(&self) -> Result<Vec<Device>, SyncError> {
        self.get_json("/reader/devices").await
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// What happened to a flushed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Sent,
    /// Failed transiently and was queued for replay.
    Queued,
    /// Rejected by the server; not queued.
    Dropped,
}

/// Counts from one [`SyncClient::replay`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub progress_sent: usize,
    /// Queued progress dropped because a newer flush already succeeded.
    pub progress_superseded: usize,
    pub activity_records_sent: usize,
    /// Entries rejected by the server or unreadable, and removed.
    pub discarded: usize,
    /// Entries that failed again and remain queued.
    pub failed: usize,
}

pub struct SyncClient<T, S>
where
    T: SyncTransport,
    S: KeyValueStore,
{
    transport: Arc<T>,
    store: Arc<S>,
    flushed: Mutex<HashSet<String>>,
    activity_queue: Mutex<()>,
}

impl<T, S> SyncClient<T, S>
where
    T: SyncTransport,
    S: KeyValueStore,
{
    pub fn new(transport: Arc<T>, store: Arc<S>) -> Self {
        Self {
            transport,
            store,
            flushed: Mutex::new(HashSet::new()),
            activity_queue: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Push a progress event, queueing it on transient failure.
    ///
    /// The error is only ever a failure to write the queue.
    pub async fn flush_progress(&self, event: &ProgressEvent) -> StoreResult<FlushOutcome> {
        match self.transport.put_progress(event).await {
            Ok(()) => {
                self.flushed.lock().await.insert(event.document.clone());
                Ok(FlushOutcome::Sent)
            }
            Err(e) if e.is_transient() => {
                warn!(document = %event.document, error = %e, "Progress flush failed, queueing");
                self.flushed.lock().await.remove(&event.document);
                self.store
                    .set_json(&progress_key(&event.document), event)
                    .await?;
                Ok(FlushOutcome::Queued)
            }
            Err(e) => {
                warn!(document = %event.document, error = %e, "Progress rejected");
                Ok(FlushOutcome::Dropped)
            }
        }
    }

    /// Push an activity batch, appending it to the queue on transient
    /// failure.
    pub async fn flush_activity(&self, event: &ActivityEvent) -> StoreResult<FlushOutcome> {
        if event.activity.is_empty() {
            return Ok(FlushOutcome::Sent);
        }
        match self.transport.post_activity(event).await {
            Ok(()) => Ok(FlushOutcome::Sent),
            Err(e) if e.is_transient() => {
                warn!(records = event.activity.len(), error = %e, "Activity flush failed, queueing");
                self.queue_activity(event).await?;
                Ok(FlushOutcome::Queued)
            }
            Err(e) => {
                warn!(records = event.activity.len(), error = %e, "Activity rejected");
                Ok(FlushOutcome::Dropped)
            }
        }
    }

    async fn queue_activity(&self, event: &ActivityEvent) -> StoreResult<()> {
        let _queue = self.activity_queue.lock().await;
        let queued = self.queued_activity().await?;
        let batch = match queued {
            Some(mut batch) => {
                batch.device_id = event.device_id.clone();
                batch.device = event.device.clone();
                batch.activity.extend(event.activity.iter().cloned());
                batch
            }
            None => event.clone(),
        };
        self.store.set_json(ACTIVITY_KEY, &batch).await?;
        Ok(())
    }

    /// The queued activity batch. An unreadable batch is treated as empty.
    async fn queued_activity(&self) -> StoreResult<Option<ActivityEvent>> {
        match self.store.get_json::<ActivityEvent>(ACTIVITY_KEY).await {
            Ok(batch) => Ok(batch),
            Err(StoreError::Decode { reason, .. }) => {
                warn!(reason = %reason, "Discarding unreadable activity queue");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-send everything queued, deleting entries once they are accepted.
    pub async fn replay(&self) -> StoreResult<ReplayReport> {
        let mut report = ReplayReport::default();

        let entries = match self.store.find(&PROGRESS_KEY_RE, true).await? {
            FindResult::Entries(entries) => entries,
            FindResult::Keys(_) => Default::default(),
        };
        let flushed = self.flushed.lock().await.clone();
        for (key, bytes) in entries {
            let Some(id) = progress_key_id(&key) else {
                continue;
            };
            if flushed.contains(id) {
                debug!(document = id, "Queued progress superseded");
                self.store.del(&key).await?;
                report.progress_superseded += 1;
                continue;
            }
            let event: ProgressEvent = match serde_json::from_slice(&bytes) {
                Ok(event) => event,
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable queued progress");
                    self.store.del(&key).await?;
                    report.discarded += 1;
                    continue;
                }
            };
            match self.transport.put_progress(&event).await {
                Ok(()) => {
                    self.store.del(&key).await?;
                    self.flushed.lock().await.insert(id.to_string());
                    report.progress_sent += 1;
                }
                Err(e) if e.is_transient() => {
                    debug!(document = id, error = %e, "Queued progress still failing");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(document = id, error = %e, "Queued progress rejected");
                    self.store.del(&key).await?;
                    report.discarded += 1;
                }
            }
        }

        let _queue = self.activity_queue.lock().await;
        if let Some(batch) = self.queued_activity().await? {
            match self.transport.post_activity(&batch).await {
                Ok(()) => {
                    self.store.del(ACTIVITY_KEY).await?;
                    report.activity_records_sent = batch.activity.len();
                }
                Err(e) if e.is_transient() => {
                    debug!(error = %e, "Queued activity still failing");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Queued activity rejected");
                    self.store.del(ACTIVITY_KEY).await?;
                    report.discarded += 1;
                }
            }
        }

        info!(
            progress_sent = report.progress_sent,
            superseded = report.progress_superseded,
            activity_sent = report.activity_records_sent,
            failed = report.failed,
            "Replayed sync queue"
        );
        Ok(report)
    }
}
