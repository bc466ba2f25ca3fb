//! Recording fakes shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tabwarm_core::{ConnectionId, NavigationEventKind, RenderHandle};

use crate::collaborators::{NavigationRequest, RenderFactory, SessionCallback};
use crate::errors::{CallbackError, RenderError};

/// Callback that records every notification.
#[derive(Default)]
pub(crate) struct RecordingCallback {
    alive: AtomicBool,
    failing: AtomicBool,
    events: Mutex<Vec<(ConnectionId, NavigationEventKind)>>,
    invalidated: Mutex<Vec<ConnectionId>>,
}

impl RecordingCallback {
    pub(crate) fn alive() -> Arc<Self> {
        let cb = Self::default();
        cb.alive.store(true, Ordering::SeqCst);
        Arc::new(cb)
    }

    pub(crate) fn dead() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn kinds(&self) -> Vec<NavigationEventKind> {
        self.events.lock().iter().map(|(_, k)| *k).collect()
    }

    pub(crate) fn invalidated(&self) -> Vec<ConnectionId> {
        self.invalidated.lock().clone()
    }
}

impl SessionCallback for RecordingCallback {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn on_navigation_event(
        &self,
        connection: &ConnectionId,
        kind: NavigationEventKind,
    ) -> Result<(), CallbackError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CallbackError::Failed("client raised".into()));
        }
        self.events.lock().push((connection.clone(), kind));
        Ok(())
    }

    fn on_session_invalid(&self, connection: &ConnectionId) -> Result<(), CallbackError> {
        self.invalidated.lock().push(connection.clone());
        Ok(())
    }
}

/// Shared view of what a [`RecordingFactory`] did.
#[derive(Default)]
pub(crate) struct FactoryLog {
    pub(crate) created: Vec<RenderHandle>,
    pub(crate) destroyed: Vec<RenderHandle>,
    pub(crate) navigations: Vec<(RenderHandle, NavigationRequest)>,
    pub(crate) fail_create: bool,
    pub(crate) fail_navigate: bool,
}

impl FactoryLog {
    pub(crate) fn live(&self) -> Vec<RenderHandle> {
        self.created
            .iter()
            .copied()
            .filter(|h| !self.destroyed.contains(h))
            .collect()
    }
}

/// Render factory that hands out sequential handles and logs calls.
pub(crate) struct RecordingFactory {
    next: u64,
    log: Arc<Mutex<FactoryLog>>,
}

impl RecordingFactory {
    pub(crate) fn new() -> (Self, Arc<Mutex<FactoryLog>>) {
        let log = Arc::new(Mutex::new(FactoryLog::default()));
        (
            Self {
                next: 1,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl RenderFactory for RecordingFactory {
    fn create(&mut self) -> Result<RenderHandle, RenderError> {
        let mut log = self.log.lock();
        if log.fail_create {
            return Err(RenderError::Create("out of renderers".into()));
        }
        let handle = RenderHandle::new(self.next);
        self.next += 1;
        log.created.push(handle);
        Ok(handle)
    }

    fn destroy(&mut self, handle: RenderHandle) {
        self.log.lock().destroyed.push(handle);
    }

    fn navigate(
        &mut self,
        handle: RenderHandle,
        request: &NavigationRequest,
    ) -> Result<(), RenderError> {
        let mut log = self.log.lock();
        if log.fail_navigate {
            return Err(RenderError::Navigate("renderer crashed".into()));
        }
        log.navigations.push((handle, request.clone()));
        Ok(())
    }
}
