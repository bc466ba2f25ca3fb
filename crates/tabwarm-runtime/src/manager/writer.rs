//! Ordered, off-thread persistence of throttle rows.
//!
//! Saves are queued from the home thread and applied one at a time on the
//! blocking pool, so a later write for an identity never lands before an
//! earlier one.

use tabwarm_core::OwnerIdentity;
use tabwarm_store::{StoredThrottleRecord, ThrottleStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type SaveRequest = (OwnerIdentity, StoredThrottleRecord);

/// Background writer for one [`ThrottleStore`].
pub(crate) struct StoreWriter {
    tx: Option<mpsc::UnboundedSender<SaveRequest>>,
    task: Option<JoinHandle<()>>,
}

impl StoreWriter {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub(crate) fn spawn(store: ThrottleStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(store, rx));
        Self {
            tx: Some(tx),
            task: Some(task),
        }
    }

    /// Queue a save. Dropped with a warning once the writer is closed.
    pub(crate) fn save(&self, owner: OwnerIdentity, record: StoredThrottleRecord) {
        let queued = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send((owner, record)).is_ok());
        if !queued {
            warn!(%owner, "throttle writer closed, dropping save");
        }
    }

    /// Close the queue and wait until every queued save has been applied.
    pub(crate) async fn flush(&mut self) {
        drop(self.tx.take());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "throttle writer task failed");
            }
        }
    }
}

async fn run(store: ThrottleStore, mut rx: mpsc::UnboundedReceiver<SaveRequest>) {
    while let Some((owner, record)) = rx.recv().await {
        let store = store.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(owner, &record)).await;
        match saved {
            Ok(Ok(())) => debug!(%owner, "throttle row saved"),
            Ok(Err(e)) => warn!(%owner, error = %e, "failed to save throttle row"),
            Err(e) => warn!(%owner, error = %e, "throttle save task panicked"),
        }
    }
}
