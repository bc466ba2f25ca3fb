//! Manager lifecycle notifications for in-process observers.
//!
//! UI collaborators (banners, notification surfaces, diagnostics) subscribe
//! through [`crate::ManagerHandle::subscribe`]. Emission never blocks: slow
//! receivers lag and drop events.

use std::sync::atomic::{AtomicU64, Ordering};

use tabwarm_core::{ConnectionId, OwnerIdentity, RenderHandle};
use tokio::sync::broadcast;

use crate::prerender::SlotOutcome;
use crate::sessions::CloseReason;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Something the manager did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A session was opened.
    SessionOpened {
        /// New connection.
        connection: ConnectionId,
        /// Owning identity.
        owner: OwnerIdentity,
    },
    /// A session was closed.
    SessionClosed {
        /// Closed connection.
        connection: ConnectionId,
        /// Why.
        reason: CloseReason,
    },
    /// A prerender started.
    PrerenderStarted {
        /// Predicting session.
        connection: ConnectionId,
        /// Predicted URL.
        url: String,
        /// Speculative resource.
        handle: RenderHandle,
    },
    /// A prerender slot ended.
    PrerenderEnded {
        /// Predicting session.
        connection: ConnectionId,
        /// Predicted URL.
        url: String,
        /// How it ended.
        outcome: SlotOutcome,
    },
    /// A spare resource was warmed.
    SpareCreated {
        /// Spare resource.
        handle: RenderHandle,
    },
    /// A navigation reused the spare.
    SpareConsumed {
        /// Spare resource.
        handle: RenderHandle,
    },
    /// An identity exhausted its score.
    IdentityBanned {
        /// Banned identity.
        owner: OwnerIdentity,
        /// End of the ban (epoch milliseconds).
        until_ms: i64,
    },
}

impl ManagerEvent {
    /// Event type string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionOpened { .. } => "session_opened",
            Self::SessionClosed { .. } => "session_closed",
            Self::PrerenderStarted { .. } => "prerender_started",
            Self::PrerenderEnded { .. } => "prerender_ended",
            Self::SpareCreated { .. } => "spare_created",
            Self::SpareConsumed { .. } => "spare_consumed",
            Self::IdentityBanned { .. } => "identity_banned",
        }
    }

    /// Connection the event concerns, if any.
    pub fn connection(&self) -> Option<&ConnectionId> {
        match self {
            Self::SessionOpened { connection, .. }
            | Self::SessionClosed { connection, .. }
            | Self::PrerenderStarted { connection, .. }
            | Self::PrerenderEnded { connection, .. } => Some(connection),
            _ => None,
        }
    }
}

/// Broadcast emitter for [`ManagerEvent`]s.
pub struct EventEmitter {
    tx: broadcast::Sender<ManagerEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit to all subscribers. Returns how many received it.
    pub fn emit(&self, event: ManagerEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }

    /// Active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
