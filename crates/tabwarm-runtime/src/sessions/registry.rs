//! Connection-keyed client sessions.
//!
//! The registry is the single source of truth for "is this session live".
//! Closing is idempotent and always releases the keep-alive binding.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tabwarm_core::{ConnectionId, OwnerIdentity};
use tracing::{debug, info, warn};

use crate::affinity::ThreadAffinity;
use crate::collaborators::{KeepAliveBinder, SessionCallback};
use crate::errors::Rejected;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client asked to disconnect.
    ClientDisconnect,
    /// The connection host reported the client process gone.
    ConnectionLost,
    /// The periodic sweep found the callback dead.
    CallbackDead,
    /// Too many consecutive callback failures.
    CallbackFailures,
    /// The manager is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Short label for logs and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientDisconnect => "client_disconnect",
            Self::ConnectionLost => "connection_lost",
            Self::CallbackDead => "callback_dead",
            Self::CallbackFailures => "callback_failures",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether the client should receive `on_session_invalid`.
    pub fn notifies_client(self) -> bool {
        matches!(self, Self::CallbackFailures | Self::Shutdown)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One open client connection.
pub struct ClientSession {
    connection_id: ConnectionId,
    owner: OwnerIdentity,
    callback: Arc<dyn SessionCallback>,
    referrer: Option<String>,
    keep_alive_requested: bool,
    keep_alive_bound: bool,
    callback_failures: u32,
    opened_at_ms: i64,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("connection_id", &self.connection_id)
            .field("owner", &self.owner)
            .field("referrer", &self.referrer)
            .field("keep_alive_requested", &self.keep_alive_requested)
            .field("callback_failures", &self.callback_failures)
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    /// Connection handle issued at open.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Owning process identity.
    pub fn owner(&self) -> OwnerIdentity {
        self.owner
    }

    /// Registered callback.
    pub fn callback(&self) -> &Arc<dyn SessionCallback> {
        &self.callback
    }

    /// Session-level referrer, used when a call omits its own.
    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    /// Whether the client asked for a keep-alive.
    pub fn keep_alive_requested(&self) -> bool {
        self.keep_alive_requested
    }

    /// Whether a keep-alive binding is currently held.
    pub fn keep_alive_bound(&self) -> bool {
        self.keep_alive_bound
    }

    /// Consecutive callback failures.
    pub fn callback_failures(&self) -> u32 {
        self.callback_failures
    }

    /// Open time (epoch milliseconds).
    pub fn opened_at_ms(&self) -> i64 {
        self.opened_at_ms
    }
}

/// Open sessions keyed by connection.
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, ClientSession>,
    max_sessions: usize,
    keep_alive: Option<Arc<dyn KeepAliveBinder>>,
    affinity: ThreadAffinity,
}

impl SessionRegistry {
    /// Empty registry. `keep_alive` is `None` when the host cannot bind.
    pub fn new(max_sessions: usize, keep_alive: Option<Arc<dyn KeepAliveBinder>>) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
            keep_alive,
            affinity: ThreadAffinity::current(),
        }
    }

    /// Allocate a session for `owner`.
    pub fn open(
        &mut self,
        owner: OwnerIdentity,
        callback: Arc<dyn SessionCallback>,
        now_ms: i64,
    ) -> Result<ConnectionId, Rejected> {
        self.affinity.assert_current("SessionRegistry::open");
        if !callback.is_alive() {
            return Err(Rejected::InvalidCallback);
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(Rejected::CapacityExceeded {
                current: self.sessions.len(),
                max: self.max_sessions,
            });
        }
        let connection_id = ConnectionId::generate();
        let session = ClientSession {
            connection_id: connection_id.clone(),
            owner,
            callback,
            referrer: None,
            keep_alive_requested: false,
            keep_alive_bound: false,
            callback_failures: 0,
            opened_at_ms: now_ms,
        };
        let _ = self.sessions.insert(connection_id.clone(), session);
        info!(connection = %connection_id, %owner, open = self.sessions.len(), "session opened");
        Ok(connection_id)
    }

    /// Remove a session. Returns `None` if it was already gone.
    pub fn close(&mut self, connection: &ConnectionId) -> Option<ClientSession> {
        self.affinity.assert_current("SessionRegistry::close");
        let mut session = self.sessions.remove(connection)?;
        self.release_keep_alive(&mut session);
        Some(session)
    }

    /// The live session for `connection`, if any.
    pub fn lookup(&self, connection: &ConnectionId) -> Option<&ClientSession> {
        self.sessions.get(connection)
    }

    /// Whether `connection` is live.
    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.sessions.contains_key(connection)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Set the session-level referrer. Returns `false` for stale sessions.
    pub fn set_referrer(&mut self, connection: &ConnectionId, referrer: Option<String>) -> bool {
        self.affinity.assert_current("SessionRegistry::set_referrer");
        let Some(session) = self.sessions.get_mut(connection) else {
            return false;
        };
        session.referrer = referrer.filter(|r| !r.is_empty());
        true
    }

    /// Request or release a keep-alive. Returns whether a binding is now held.
    pub fn set_keep_alive(&mut self, connection: &ConnectionId, keep_alive: bool) -> bool {
        self.affinity.assert_current("SessionRegistry::set_keep_alive");
        let Some(session) = self.sessions.get_mut(connection) else {
            debug!(%connection, "keep-alive change for stale session");
            return false;
        };
        session.keep_alive_requested = keep_alive;
        match (&self.keep_alive, keep_alive, session.keep_alive_bound) {
            (Some(binder), true, false) => {
                session.keep_alive_bound = binder.bind(connection, session.owner);
                if !session.keep_alive_bound {
                    warn!(%connection, "host refused keep-alive binding");
                }
            }
            (Some(binder), false, true) => {
                binder.unbind(connection);
                session.keep_alive_bound = false;
            }
            (None, true, _) => debug!(%connection, "keep-alive unsupported by host"),
            _ => {}
        }
        session.keep_alive_bound
    }

    /// Count a failed delivery. Returns the new consecutive-failure count.
    pub fn record_callback_failure(&mut self, connection: &ConnectionId) -> Option<u32> {
        let session = self.sessions.get_mut(connection)?;
        session.callback_failures = session.callback_failures.saturating_add(1);
        Some(session.callback_failures)
    }

    /// Reset the failure count after a successful delivery.
    pub fn reset_callback_failures(&mut self, connection: &ConnectionId) {
        if let Some(session) = self.sessions.get_mut(connection) {
            session.callback_failures = 0;
        }
    }

    /// Sessions whose callback reports dead.
    pub fn dead_sessions(&self) -> Vec<ConnectionId> {
        self.sessions
            .values()
            .filter(|s| !s.callback.is_alive())
            .map(|s| s.connection_id.clone())
            .collect()
    }

    /// Every live connection.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().cloned().collect()
    }

    fn release_keep_alive(&self, session: &mut ClientSession) {
        if !session.keep_alive_bound {
            return;
        }
        if let Some(binder) = &self.keep_alive {
            binder.unbind(&session.connection_id);
        }
        session.keep_alive_bound = false;
    }
}
