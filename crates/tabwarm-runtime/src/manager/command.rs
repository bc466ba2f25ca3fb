//! Messages marshalled onto the home thread.

use std::sync::Arc;

use tabwarm_core::{ConnectionId, OwnerIdentity, RenderHandle, SurfaceEvent};
use tabwarm_store::StoredThrottleRecord;
use tokio::sync::oneshot;

use super::core::{ManagerCore, ManagerSnapshot, NavigationOutcome};
use crate::collaborators::{PredictionExtras, SessionCallback};
use crate::errors::{Rejected, Result};
use crate::sessions::CloseReason;

pub(crate) type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Open {
        owner: OwnerIdentity,
        callback: Arc<dyn SessionCallback>,
        reply: Reply<std::result::Result<ConnectionId, Rejected>>,
    },
    Close {
        connection: ConnectionId,
        reason: CloseReason,
        reply: Option<Reply<bool>>,
    },
    SessionExists {
        connection: ConnectionId,
        reply: Reply<bool>,
    },
    SetReferrer {
        connection: ConnectionId,
        referrer: Option<String>,
        reply: Reply<bool>,
    },
    SetKeepAlive {
        connection: ConnectionId,
        keep_alive: bool,
        reply: Reply<bool>,
    },
    Predict {
        connection: ConnectionId,
        url: String,
        referrer: Option<String>,
        extras: PredictionExtras,
        reply: Reply<Result<()>>,
    },
    CancelPrediction {
        connection: Option<ConnectionId>,
        reply: Reply<bool>,
    },
    Navigate {
        connection: ConnectionId,
        url: String,
        referrer: Option<String>,
        extras: PredictionExtras,
        reply: Reply<Result<NavigationOutcome>>,
    },
    Warmup {
        reply: Reply<bool>,
    },
    IsAllowed {
        owner: OwnerIdentity,
        reply: Reply<bool>,
    },
    SurfaceEvent {
        handle: RenderHandle,
        event: SurfaceEvent,
    },
    SurfaceClosed {
        handle: RenderHandle,
    },
    Snapshot {
        reply: Reply<ManagerSnapshot>,
    },
    StoreWarmed {
        records: Vec<(OwnerIdentity, StoredThrottleRecord)>,
    },
    SweepDeadSessions,
    Shutdown {
        reply: Option<Reply<()>>,
    },
}

impl Command {
    /// Apply everything but `Shutdown`, which the loop handles itself.
    pub(crate) async fn apply(self, core: &mut ManagerCore) {
        match self {
            Self::Open {
                owner,
                callback,
                reply,
            } => {
                let _ = reply.send(core.open_session(owner, callback));
            }
            Self::Close {
                connection,
                reason,
                reply,
            } => {
                let closed = core.close_session(&connection, reason);
                if let Some(reply) = reply {
                    let _ = reply.send(closed);
                }
            }
            Self::SessionExists { connection, reply } => {
                let _ = reply.send(core.session_exists(&connection));
            }
            Self::SetReferrer {
                connection,
                referrer,
                reply,
            } => {
                let _ = reply.send(core.set_referrer(&connection, referrer));
            }
            Self::SetKeepAlive {
                connection,
                keep_alive,
                reply,
            } => {
                let _ = reply.send(core.set_keep_alive(&connection, keep_alive));
            }
            Self::Predict {
                connection,
                url,
                referrer,
                extras,
                reply,
            } => {
                let result = core
                    .request_prediction(&connection, url, referrer, extras)
                    .await;
                let _ = reply.send(result);
            }
            Self::CancelPrediction { connection, reply } => {
                let _ = reply.send(core.cancel_prediction(connection.as_ref()));
            }
            Self::Navigate {
                connection,
                url,
                referrer,
                extras,
                reply,
            } => {
                let result = core.navigate(&connection, url, referrer, extras).await;
                let _ = reply.send(result);
            }
            Self::Warmup { reply } => {
                let _ = reply.send(core.warmup());
            }
            Self::IsAllowed { owner, reply } => {
                let _ = reply.send(core.is_allowed(owner).await);
            }
            Self::SurfaceEvent { handle, event } => core.surface_event(handle, &event),
            Self::SurfaceClosed { handle } => core.surface_closed(handle),
            Self::Snapshot { reply } => {
                let _ = reply.send(core.snapshot());
            }
            Self::StoreWarmed { records } => {
                let _ = core.apply_warmed_records(records);
            }
            Self::SweepDeadSessions => {
                let _ = core.sweep_dead_sessions();
            }
            Self::Shutdown { .. } => {}
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Close { .. } => "close",
            Self::SessionExists { .. } => "session_exists",
            Self::SetReferrer { .. } => "set_referrer",
            Self::SetKeepAlive { .. } => "set_keep_alive",
            Self::Predict { .. } => "predict",
            Self::CancelPrediction { .. } => "cancel_prediction",
            Self::Navigate { .. } => "navigate",
            Self::Warmup { .. } => "warmup",
            Self::IsAllowed { .. } => "is_allowed",
            Self::SurfaceEvent { .. } => "surface_event",
            Self::SurfaceClosed { .. } => "surface_closed",
            Self::Snapshot { .. } => "snapshot",
            Self::StoreWarmed { .. } => "store_warmed",
            Self::SweepDeadSessions => "sweep_dead_sessions",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}
