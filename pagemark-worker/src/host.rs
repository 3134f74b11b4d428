//! Background worker host.
//!
//! Runs a [`CachePolicyEngine`] as an independent task that the page talks
//! to only through envelopes. The lifecycle is published on a watch channel
//! so observers can check the current state and then wait for changes
//! without missing a transition in between.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::CacheStorage;
use crate::control::{ControlMessage, Envelope};
use crate::engine::CachePolicyEngine;
use crate::http::Fetcher;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    /// Installed or later, and still usable.
    pub fn is_ready(self) -> bool {
        matches!(self, WorkerState::Installed | WorkerState::Activated)
    }
}

/// Page-side handle to a running worker.
#[derive(Debug)]
pub struct WorkerRegistration {
    pub(crate) state: watch::Receiver<WorkerState>,
    pub(crate) to_worker: mpsc::UnboundedSender<Envelope>,
    pub(crate) from_worker: mpsc::UnboundedReceiver<Envelope>,
    pub(crate) task: Option<JoinHandle<()>>,
}

impl WorkerRegistration {
    /// Assemble a registration around an externally driven worker.
    pub fn from_parts(
        state: watch::Receiver<WorkerState>,
        to_worker: mpsc::UnboundedSender<Envelope>,
        from_worker: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            state,
            to_worker,
            from_worker,
            task: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }
}

/// Start a worker: install, activate, then serve control messages until
/// the page side hangs up.
pub fn spawn_worker<F, C>(engine: CachePolicyEngine<F, C>) -> WorkerRegistration
where
    F: Fetcher + 'static,
    C: CacheStorage + 'static,
{
    let (state_tx, state_rx) = watch::channel(WorkerState::Parsed);
    let (to_worker, mut inbox) = mpsc::unbounded_channel::<Envelope>();
    let (outbox, from_worker) = mpsc::unbounded_channel::<Envelope>();

    let task = tokio::spawn(async move {
        state_tx.send_replace(WorkerState::Installing);
        if let Err(e) = engine.install().await {
            error!(error = %e, "Worker install failed");
            state_tx.send_replace(WorkerState::Redundant);
            return;
        }
        state_tx.send_replace(WorkerState::Installed);
        state_tx.send_replace(WorkerState::Activating);
        state_tx.send_replace(WorkerState::Activated);
        info!("Worker activated");

        while let Some(Envelope { id, data }) = inbox.recv().await {
            let engine = engine.clone();
            let outbox = outbox.clone();
            tokio::spawn(async move {
                let reply = engine.handle_message(ControlMessage::from_data(data)).await;
                // The page may already be gone.
                let _ = outbox.send(Envelope { id, data: reply });
            });
        }

        state_tx.send_replace(WorkerState::Redundant);
        info!("Worker stopped");
    });

    WorkerRegistration {
        state: state_rx,
        to_worker,
        from_worker,
        task: Some(task),
    }
}
