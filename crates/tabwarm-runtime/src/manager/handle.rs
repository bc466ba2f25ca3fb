//! Thread-safe entry points.
//!
//! [`ManagerHandle`] is cheap to clone and may be used from any thread. Each
//! call is marshalled onto the home thread as a command and applied in
//! arrival order.

use std::sync::Arc;

use tabwarm_core::{ConnectionId, OwnerIdentity, RenderHandle, SurfaceEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::command::Command;
use super::core::{ManagerSnapshot, NavigationOutcome};
use crate::collaborators::{PredictionExtras, SessionCallback};
use crate::errors::{ManagerError, Result};
use crate::events::{EventEmitter, ManagerEvent};
use crate::sessions::CloseReason;

/// Handle to a running manager.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<Command>,
    emitter: Arc<EventEmitter>,
}

impl std::fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl ManagerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>, emitter: Arc<EventEmitter>) -> Self {
        Self { tx, emitter }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| ManagerError::Shutdown)?;
        rx.await.map_err(|_| ManagerError::Shutdown)
    }

    fn post(&self, command: Command) {
        let name = command.name();
        if self.tx.send(command).is_err() {
            debug!(command = name, "manager shut down, dropping command");
        }
    }

    /// Open a session for `owner`.
    pub async fn open(
        &self,
        owner: OwnerIdentity,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<ConnectionId> {
        self.call(|reply| Command::Open {
            owner,
            callback,
            reply,
        })
        .await?
        .map_err(Into::into)
    }

    /// Close a session at the client's request. Idempotent.
    pub async fn close(&self, connection: &ConnectionId) -> Result<bool> {
        self.call(|reply| Command::Close {
            connection: connection.clone(),
            reason: CloseReason::ClientDisconnect,
            reply: Some(reply),
        })
        .await
    }

    /// The connection host saw the client process die.
    pub fn connection_lost(&self, connection: &ConnectionId) {
        self.post(Command::Close {
            connection: connection.clone(),
            reason: CloseReason::ConnectionLost,
            reply: None,
        });
    }

    /// Whether `connection` is live.
    pub async fn session_exists(&self, connection: &ConnectionId) -> Result<bool> {
        self.call(|reply| Command::SessionExists {
            connection: connection.clone(),
            reply,
        })
        .await
    }

    /// Set the session-level referrer. `Ok(false)` for stale sessions.
    pub async fn set_referrer(
        &self,
        connection: &ConnectionId,
        referrer: Option<String>,
    ) -> Result<bool> {
        self.call(|reply| Command::SetReferrer {
            connection: connection.clone(),
            referrer,
            reply,
        })
        .await
    }

    /// Request or release a keep-alive. Returns whether one is held.
    pub async fn set_keep_alive(&self, connection: &ConnectionId, keep_alive: bool) -> Result<bool> {
        self.call(|reply| Command::SetKeepAlive {
            connection: connection.clone(),
            keep_alive,
            reply,
        })
        .await
    }

    /// Hint that `url` will likely be navigated to soon.
    pub async fn request_prediction(
        &self,
        connection: &ConnectionId,
        url: impl Into<String>,
        referrer: Option<String>,
        extras: PredictionExtras,
    ) -> Result<()> {
        let url = url.into();
        self.call(|reply| Command::Predict {
            connection: connection.clone(),
            url,
            referrer,
            extras,
            reply,
        })
        .await?
    }

    /// Cancel `connection`'s prerender, or any prerender when `None`.
    pub async fn cancel_prediction(&self, connection: Option<&ConnectionId>) -> Result<bool> {
        self.call(|reply| Command::CancelPrediction {
            connection: connection.cloned(),
            reply,
        })
        .await
    }

    /// Perform a real navigation.
    pub async fn navigate(
        &self,
        connection: &ConnectionId,
        url: impl Into<String>,
        referrer: Option<String>,
        extras: PredictionExtras,
    ) -> Result<NavigationOutcome> {
        let url = url.into();
        self.call(|reply| Command::Navigate {
            connection: connection.clone(),
            url,
            referrer,
            extras,
            reply,
        })
        .await?
    }

    /// Warm the process. Returns whether a spare is ready.
    pub async fn warmup(&self) -> Result<bool> {
        self.call(|reply| Command::Warmup { reply }).await
    }

    /// Whether `owner` may prerender now.
    pub async fn is_allowed(&self, owner: OwnerIdentity) -> Result<bool> {
        self.call(|reply| Command::IsAllowed { owner, reply }).await
    }

    /// Report a lifecycle transition of a surface returned by `navigate`.
    pub fn surface_event(&self, handle: RenderHandle, event: SurfaceEvent) {
        self.post(Command::SurfaceEvent { handle, event });
    }

    /// Report that a surface returned by `navigate` was closed.
    pub fn surface_closed(&self, handle: RenderHandle) {
        self.post(Command::SurfaceClosed { handle });
    }

    /// Current manager state.
    pub async fn snapshot(&self) -> Result<ManagerSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.emitter.subscribe()
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply: Some(reply) })
            .await
    }

    pub(crate) fn post_shutdown(&self) {
        self.post(Command::Shutdown { reply: None });
    }

    /// Whether the home thread has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
