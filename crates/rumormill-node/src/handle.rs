//! The node handle: the capability workers use to reach the event
//! loop.
//!
//! Replaces the process-wide mutable context of classic gossip daemons
//! with an explicit value that is assembled once at startup and
//! injected everywhere: it carries the event-queue sender plus the
//! immutable identity (keypair, display name, configuration), so
//! workers can sign and mine without a loop round-trip.

use std::sync::Arc;

use rumormill_crypto::keys::Keypair;
use rumormill_types::config::AppConfig;
use rumormill_types::{Result, RumormillError};
use tokio::sync::{mpsc, oneshot};

use crate::state::NodeState;

/// A unit of work executed on the event-loop task with exclusive
/// access to the node state.
pub type Task = Box<dyn FnOnce(&mut NodeState) + Send + 'static>;

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    task_tx: mpsc::Sender<Task>,
    /// The node's long-lived keypair (immutable, shared).
    pub keypair: Arc<Keypair>,
    /// The node's display name, derived from the keypair.
    pub name: String,
    /// The node configuration.
    pub config: Arc<AppConfig>,
}

impl NodeHandle {
    pub(crate) fn new(
        task_tx: mpsc::Sender<Task>,
        keypair: Arc<Keypair>,
        name: String,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            task_tx,
            keypair,
            name,
            config,
        }
    }

    /// Runs `f` on the event loop and waits for its result.
    ///
    /// Must only be called from worker tasks — calling it from the
    /// loop itself would deadlock, since the loop cannot process the
    /// queued closure while blocked on it.
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::NetworkError`] if the event loop has
    /// shut down.
    pub async fn run_sync<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut NodeState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: Task = Box::new(move |state| {
            let _ = tx.send(f(state));
        });
        self.task_tx
            .send(task)
            .await
            .map_err(|_| loop_stopped())?;
        rx.await.map_err(|_| loop_stopped())
    }
}

fn loop_stopped() -> RumormillError {
    RumormillError::NetworkError {
        reason: "event loop has stopped".into(),
    }
}
