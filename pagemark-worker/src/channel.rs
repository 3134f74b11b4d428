//! Page-side request/response channel to the background worker.
//!
//! Each outgoing message gets a fresh random id and a pending resolver.
//! A single listener task matches replies to resolvers by id. Replies
//! nobody is waiting for are logged and dropped.

use pagemark_core::{random_id, WorkerError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::{ControlMessage, Envelope, SUCCESS};
use crate::host::{WorkerRegistration, WorkerState};

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

struct Connection {
    state: watch::Receiver<WorkerState>,
    to_worker: mpsc::UnboundedSender<Envelope>,
}

pub struct WorkerChannel {
    connection: Option<Connection>,
    pending: Pending,
    timeout: Duration,
    listener: Option<JoinHandle<()>>,
    // Held so the worker task is not detached before the channel is dropped.
    _worker: Option<JoinHandle<()>>,
}

impl WorkerChannel {
    /// Attach to a worker. `None` means the environment has no background
    /// worker support; every operation then fails.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(registration: Option<WorkerRegistration>, timeout: Duration) -> Self {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        match registration {
            None => Self {
                connection: None,
                pending,
                timeout,
                listener: None,
                _worker: None,
            },
            Some(registration) => {
                let listener = tokio::spawn(listen(registration.from_worker, Arc::clone(&pending)));
                Self {
                    connection: Some(Connection {
                        state: registration.state,
                        to_worker: registration.to_worker,
                    }),
                    pending,
                    timeout,
                    listener: Some(listener),
                    _worker: registration.task,
                }
            }
        }
    }

    /// Current worker state, `None` when unsupported.
    pub fn state(&self) -> Option<WorkerState> {
        self.connection.as_ref().map(|c| *c.state.borrow())
    }

    /// Wait until the worker is installed or activated.
    ///
    /// The current state is checked before waiting, so a worker that is
    /// already active resolves immediately.
    pub async fn install(&self) -> Result<WorkerState, WorkerError> {
        let connection = self.connection.as_ref().ok_or(WorkerError::Unsupported)?;
        let mut state = connection.state.clone();
        let reached = *state
            .wait_for(|s| s.is_ready() || *s == WorkerState::Redundant)
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        if reached == WorkerState::Redundant {
            return Err(WorkerError::InstallFailed {
                reason: "worker became redundant".to_string(),
            });
        }
        info!(state = ?reached, "Worker installed");
        Ok(reached)
    }

    /// Send a control message and wait for its reply.
    pub async fn send(&self, message: &ControlMessage) -> Result<Value, WorkerError> {
        let data = serde_json::to_value(message).map_err(|e| WorkerError::InvalidMessage {
            reason: e.to_string(),
        })?;
        self.send_value(data).await
    }

    /// Send raw message data and wait for its reply.
    pub async fn send_value(&self, data: Value) -> Result<Value, WorkerError> {
        let connection = self.connection.as_ref().ok_or(WorkerError::Inactive)?;
        if *connection.state.borrow() != WorkerState::Activated {
            return Err(WorkerError::Inactive);
        }

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.pending.lock().await;
            let mut id = random_id();
            while pending.contains_key(&id) {
                id = random_id();
            }
            pending.insert(id.clone(), tx);
            id
        };

        debug!(id = %id, "Posting worker message");
        if connection
            .to_worker
            .send(Envelope {
                id: id.clone(),
                data,
            })
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(WorkerError::ChannelClosed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(WorkerError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(id = %id, "Worker message timed out");
                Err(WorkerError::Timeout {
                    id,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Number of messages still awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn version(&self) -> Result<u64, WorkerError> {
        let reply = self.send(&ControlMessage::GetSwVersion).await?;
        reply.as_u64().ok_or_else(|| WorkerError::InvalidMessage {
            reason: format!("expected integer version, got {}", reply),
        })
    }

    pub async fn purge_cache(&self) -> Result<bool, WorkerError> {
        let reply = self.send(&ControlMessage::PurgeSwCache).await?;
        Ok(reply == SUCCESS)
    }

    /// Progress objects of every fully cached document.
    pub async fn cached_documents(&self) -> Result<Vec<Value>, WorkerError> {
        match self.send(&ControlMessage::GetSwCache).await? {
            Value::Array(documents) => Ok(documents),
            other => Err(WorkerError::InvalidMessage {
                reason: format!("expected array of documents, got {}", other),
            }),
        }
    }

    pub async fn delete_cached(&self, id: &str) -> Result<bool, WorkerError> {
        let reply = self
            .send(&ControlMessage::DelSwCache { id: id.to_string() })
            .await?;
        Ok(reply == SUCCESS)
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn listen(mut from_worker: mpsc::UnboundedReceiver<Envelope>, pending: Pending) {
    while let Some(Envelope { id, data }) = from_worker.recv().await {
        let waiter = pending.lock().await.remove(&id);
        match waiter {
            Some(tx) => {
                // The sender may have timed out already.
                let _ = tx.send(data);
            }
            None => warn!(id = %id, "No pending message for worker reply"),
        }
    }
    debug!("Worker reply stream closed");
}
