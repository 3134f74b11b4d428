//! Worker control protocol.
//!
//! The page posts `{id, data}` envelopes; `data.type` selects the command.
//! Replies reuse the request id. Anything that is not a known command is
//! answered with a liveness echo, `{"pong": 1}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::cache::CacheStorage;
use crate::engine::CachePolicyEngine;
use crate::http::{Fetcher, Request};
use crate::SW_VERSION;

pub const SUCCESS: &str = "SUCCESS";
pub const FAILURE: &str = "FAILURE";

const DOCUMENTS_PREFIX: &str = "/documents/";

/// A message between page and worker, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    GetSwVersion,
    PurgeSwCache,
    GetSwCache,
    DelSwCache { id: String },
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Decode message data. Undecodable data is treated as unknown.
    pub fn from_data(data: Value) -> Self {
        serde_json::from_value(data).unwrap_or(Self::Unknown)
    }
}

pub fn pong() -> Value {
    json!({ "pong": 1 })
}

fn outcome(ok: bool) -> Value {
    Value::String(if ok { SUCCESS } else { FAILURE }.to_string())
}

fn file_path(id: &str) -> String {
    format!("{}{}/file", DOCUMENTS_PREFIX, id)
}

fn progress_path(id: &str) -> String {
    format!("{}{}/progress", DOCUMENTS_PREFIX, id)
}

impl<F, C> CachePolicyEngine<F, C>
where
    F: Fetcher + 'static,
    C: CacheStorage + 'static,
{
    /// Answer a control message.
    pub async fn handle_message(&self, message: ControlMessage) -> Value {
        debug!(message = ?message, "Handling control message");
        match message {
            ControlMessage::GetSwVersion => json!(SW_VERSION),
            ControlMessage::PurgeSwCache => match self.purge().await {
                Ok(()) => outcome(true),
                Err(e) => {
                    warn!(error = %e, "Cache purge failed");
                    outcome(false)
                }
            },
            ControlMessage::GetSwCache => Value::Array(self.cached_documents().await),
            ControlMessage::DelSwCache { id } => match self.delete_document(&id).await {
                Ok(()) => outcome(true),
                Err(e) => {
                    warn!(id = %id, error = %e, "Cached document delete failed");
                    outcome(false)
                }
            },
            ControlMessage::Unknown => pong(),
        }
    }

    /// Progress objects of every document whose file and progress are both
    /// cached. Progress is refreshed from the network when possible.
    pub async fn cached_documents(&self) -> Vec<Value> {
        let keys = match self.cache.keys(&self.config.cache_name).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                return Vec::new();
            }
        };
        let resources: HashSet<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|path| path.starts_with(DOCUMENTS_PREFIX))
            .collect();

        let mut seen = HashSet::new();
        let ids: Vec<&str> = keys
            .iter()
            .filter(|path| path.starts_with(DOCUMENTS_PREFIX))
            .filter_map(|path| path.split('/').nth(2))
            .filter(|id| seen.insert(*id))
            .collect();

        let mut documents = Vec::new();
        for id in ids {
            let progress = progress_path(id);
            if !resources.contains(file_path(id).as_str()) || !resources.contains(progress.as_str()) {
                continue;
            }

            let refreshed = self
                .update_cache(&Request::get(progress.clone()))
                .await
                .ok()
                .filter(|response| response.is_success());
            let response = match refreshed {
                Some(response) => Some(response),
                None => self.cache.match_any(&progress).await.ok().flatten(),
            };
            let Some(response) = response else {
                warn!(id, "Cached progress disappeared");
                continue;
            };

            match response.json::<Value>() {
                Ok(value) => documents.push(value),
                Err(e) => warn!(id, error = %e, "Cached progress is not JSON"),
            }
        }
        documents
    }

    /// Drop the cached file and progress of a document.
    pub async fn delete_document(&self, id: &str) -> Result<(), pagemark_core::WorkerError> {
        let cache = &self.config.cache_name;
        self.cache.delete(cache, &file_path(id)).await?;
        self.cache.delete(cache, &progress_path(id)).await?;
        Ok(())
    }
}
