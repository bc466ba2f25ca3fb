//! Fakes for driving a real home thread from integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tabwarm_core::{ConnectionId, ManualClock, NavigationEventKind, RenderHandle};
use tabwarm_runtime::{
    CallbackError, ManagerDeps, NavigationRequest, RenderError, RenderFactory, SessionCallback,
    TabwarmService,
};
use tabwarm_settings::TabwarmSettings;
use tabwarm_store::{MemoryKvStore, ThrottleStore};

/// Start time for every manual clock.
pub const T0: i64 = 5_000_000;

#[derive(Debug, Default)]
pub struct Surfaces {
    next: u64,
    pub created: Vec<RenderHandle>,
    pub destroyed: Vec<RenderHandle>,
    pub loads: Vec<(RenderHandle, NavigationRequest)>,
}

impl Surfaces {
    pub fn live(&self) -> usize {
        self.created.len() - self.destroyed.len()
    }
}

/// Render factory that hands out sequential handles.
pub struct FakeFactory(pub Arc<Mutex<Surfaces>>);

impl RenderFactory for FakeFactory {
    fn create(&mut self) -> Result<RenderHandle, RenderError> {
        let mut s = self.0.lock();
        s.next += 1;
        let handle = RenderHandle::new(s.next);
        s.created.push(handle);
        Ok(handle)
    }

    fn destroy(&mut self, handle: RenderHandle) {
        self.0.lock().destroyed.push(handle);
    }

    fn navigate(
        &mut self,
        handle: RenderHandle,
        request: &NavigationRequest,
    ) -> Result<(), RenderError> {
        self.0.lock().loads.push((handle, request.clone()));
        Ok(())
    }
}

/// Client callback that records what it was told.
#[derive(Default)]
pub struct Client {
    dead: AtomicBool,
    pub events: Mutex<Vec<NavigationEventKind>>,
    pub invalidated: AtomicBool,
}

impl Client {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn die(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }
}

impl SessionCallback for Client {
    fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::SeqCst)
    }

    fn on_navigation_event(
        &self,
        _connection: &ConnectionId,
        kind: NavigationEventKind,
    ) -> Result<(), CallbackError> {
        self.events.lock().push(kind);
        Ok(())
    }

    fn on_session_invalid(&self, _connection: &ConnectionId) -> Result<(), CallbackError> {
        self.invalidated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Rig {
    pub service: TabwarmService,
    pub surfaces: Arc<Mutex<Surfaces>>,
    pub clock: Arc<ManualClock>,
    pub store: ThrottleStore,
}

pub fn start_with(settings: TabwarmSettings, store: ThrottleStore) -> Rig {
    let surfaces = Arc::new(Mutex::new(Surfaces::default()));
    let clock = Arc::new(ManualClock::new(T0));
    let deps = ManagerDeps::new(Box::new(FakeFactory(Arc::clone(&surfaces))), store.clone())
        .with_clock(clock.clone());
    let service = TabwarmService::start(settings, deps).expect("service starts");
    Rig {
        service,
        surfaces,
        clock,
        store,
    }
}

pub fn start() -> Rig {
    start_with(
        TabwarmSettings::default(),
        ThrottleStore::new(Arc::new(MemoryKvStore::new())),
    )
}
