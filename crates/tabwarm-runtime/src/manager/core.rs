//! Manager state and request handling, owned by the home thread.
//!
//! [`ManagerCore`] composes the registry, throttler, prerender manager, and
//! relay. Commands are applied strictly one after another, so an `.await`
//! inside a handler never lets another command interleave: "last request
//! wins" follows home-thread arrival order.

use std::sync::Arc;

use metrics::{counter, gauge};
use tabwarm_core::{Clock, ConnectionId, OwnerIdentity, RenderHandle, SurfaceEvent, SystemClock};
use tabwarm_settings::TabwarmSettings;
use tabwarm_store::{StoredThrottleRecord, ThrottleStore};
use tracing::{debug, info, instrument, warn};

use super::writer::StoreWriter;
use crate::affinity::ThreadAffinity;
use crate::collaborators::{
    HostCapabilities, KeepAliveBinder, NavigationRequest, PolicySource, PredictionExtras,
    RenderFactory, SessionCallback, StaticPolicy, deliver,
};
use crate::errors::{ManagerError, Rejected, Result};
use crate::events::{EventEmitter, ManagerEvent};
use crate::metrics::{
    IDENTITY_BANS_TOTAL, PREDICTIONS_TOTAL, PRERENDER_OUTCOMES_TOTAL, SESSIONS_ACTIVE,
    SPARE_EVENTS_TOTAL,
};
use crate::prerender::{EndedPrerender, PrerenderManager, SpeculationPolicy, TakeOutcome};
use crate::relay::NavigationRelay;
use crate::sessions::{CloseReason, SessionRegistry};
use crate::throttle::RequestThrottler;

/// Collaborators supplied by the embedding host.
pub struct ManagerDeps {
    /// Creates and destroys render resources.
    pub factory: Box<dyn RenderFactory>,
    /// Live policy signals.
    pub policy: Arc<dyn PolicySource>,
    /// Keep-alive binding, when the host offers one.
    pub keep_alive: Option<Arc<dyn KeepAliveBinder>>,
    /// Persisted ban state.
    pub store: ThrottleStore,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Negotiated host capabilities.
    pub capabilities: HostCapabilities,
}

impl ManagerDeps {
    /// Permissive policy, no keep-alive, wall clock, default capabilities.
    pub fn new(factory: Box<dyn RenderFactory>, store: ThrottleStore) -> Self {
        Self {
            factory,
            policy: Arc::new(StaticPolicy::default()),
            keep_alive: None,
            store,
            clock: Arc::new(SystemClock),
            capabilities: HostCapabilities::default(),
        }
    }

    /// Replace the policy source.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PolicySource>) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a keep-alive binder.
    #[must_use]
    pub fn with_keep_alive(mut self, binder: Arc<dyn KeepAliveBinder>) -> Self {
        self.keep_alive = Some(binder);
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set host capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Where the resource a navigation landed in came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// The matching prerender was adopted.
    Prerendered,
    /// The warm spare was reused.
    Spare,
    /// A new resource was created.
    Fresh,
}

/// Result of a navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// Resource now showing the page. Report its closing via `surface_closed`.
    pub handle: RenderHandle,
    /// Where it came from.
    pub origin: ResourceOrigin,
    /// The first history entry replaced the placeholder entry.
    pub replace_current_entry: bool,
}

/// Point-in-time view of the manager, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerSnapshot {
    /// Open sessions.
    pub sessions: usize,
    /// Owner and URL of the live prerender.
    pub prerender: Option<(ConnectionId, String)>,
    /// The warm spare.
    pub spare: Option<RenderHandle>,
    /// Surfaces bound to the relay.
    pub bound_surfaces: usize,
    /// Whether warmup has happened.
    pub warmed: bool,
}

/// Everything the home thread owns.
pub struct ManagerCore {
    settings: TabwarmSettings,
    sessions: SessionRegistry,
    throttler: RequestThrottler,
    prerender: PrerenderManager,
    relay: NavigationRelay,
    policy: SpeculationPolicy,
    store: ThrottleStore,
    writer: StoreWriter,
    clock: Arc<dyn Clock>,
    capabilities: HostCapabilities,
    emitter: Arc<EventEmitter>,
    warmed: bool,
    affinity: ThreadAffinity,
}

impl ManagerCore {
    /// Build the core on the calling thread, which becomes its home thread.
    ///
    /// Must be called inside a tokio runtime: the store writer task starts here.
    pub fn new(settings: TabwarmSettings, deps: ManagerDeps, emitter: Arc<EventEmitter>) -> Self {
        let keep_alive = deps.keep_alive.filter(|_| deps.capabilities.keep_alive);
        Self {
            sessions: SessionRegistry::new(settings.sessions.max_sessions, keep_alive),
            throttler: RequestThrottler::new(&settings.throttle),
            prerender: PrerenderManager::new(deps.factory),
            relay: NavigationRelay::new(settings.sessions.max_callback_failures),
            policy: SpeculationPolicy::new(&settings.prerender, deps.policy),
            writer: StoreWriter::spawn(deps.store.clone()),
            store: deps.store,
            clock: deps.clock,
            capabilities: deps.capabilities,
            emitter,
            warmed: false,
            affinity: ThreadAffinity::current(),
            settings,
        }
    }

    /// Settings the core was built with.
    pub fn settings(&self) -> &TabwarmSettings {
        &self.settings
    }

    /// The backing store.
    pub fn store(&self) -> &ThrottleStore {
        &self.store
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Open a session for `owner`.
    #[instrument(skip_all, fields(%owner))]
    pub fn open_session(
        &mut self,
        owner: OwnerIdentity,
        callback: Arc<dyn SessionCallback>,
    ) -> std::result::Result<ConnectionId, Rejected> {
        self.affinity.assert_current("ManagerCore::open_session");
        let connection = self.sessions.open(owner, callback, self.clock.now_ms())?;
        self.report_sessions();
        let _ = self.emitter.emit(ManagerEvent::SessionOpened {
            connection: connection.clone(),
            owner,
        });
        Ok(connection)
    }

    /// Close a session, cancel its prerender, and unbind its surfaces.
    /// Returns `false` if it was already closed.
    #[instrument(skip_all, fields(%connection, %reason))]
    pub fn close_session(&mut self, connection: &ConnectionId, reason: CloseReason) -> bool {
        self.affinity.assert_current("ManagerCore::close_session");
        let Some(session) = self.sessions.close(connection) else {
            debug!("close for unknown session");
            return false;
        };
        if reason.notifies_client()
            && let Err(e) = deliver(|| session.callback().on_session_invalid(connection))
        {
            debug!(error = %e, "session-invalid notification not delivered");
        }
        if let Some(ended) = self.prerender.cancel(Some(connection)) {
            self.report_prerender_end(ended);
        }
        let surfaces = self.relay.unbind_session(connection);
        self.report_sessions();
        info!(surfaces, open = self.sessions.len(), "session closed");
        let _ = self.emitter.emit(ManagerEvent::SessionClosed {
            connection: connection.clone(),
            reason,
        });
        true
    }

    /// Whether `connection` is live.
    pub fn session_exists(&self, connection: &ConnectionId) -> bool {
        self.sessions.contains(connection)
    }

    /// Set the session-level referrer.
    pub fn set_referrer(&mut self, connection: &ConnectionId, referrer: Option<String>) -> bool {
        self.affinity.assert_current("ManagerCore::set_referrer");
        self.sessions.set_referrer(connection, referrer)
    }

    /// Request or release a keep-alive. Returns whether one is held.
    pub fn set_keep_alive(&mut self, connection: &ConnectionId, keep_alive: bool) -> bool {
        self.affinity.assert_current("ManagerCore::set_keep_alive");
        self.sessions.set_keep_alive(connection, keep_alive)
    }

    /// Close every session whose callback reports dead, then evict idle
    /// throttle entries.
    pub fn sweep_dead_sessions(&mut self) -> usize {
        self.affinity.assert_current("ManagerCore::sweep_dead_sessions");
        let dead = self.sessions.dead_sessions();
        for connection in &dead {
            let _ = self.close_session(connection, CloseReason::CallbackDead);
        }
        if !dead.is_empty() {
            info!(closed = dead.len(), "swept dead sessions");
        }
        let _ = self
            .throttler
            .evict_idle(self.clock.now_ms(), self.clock.monotonic_ms());
        dead.len()
    }

    // ── Throttling ──────────────────────────────────────────────────────

    /// Seed the throttler with rows bulk-loaded at startup.
    pub fn apply_warmed_records(&mut self, records: Vec<(OwnerIdentity, StoredThrottleRecord)>) -> usize {
        self.affinity.assert_current("ManagerCore::apply_warmed_records");
        let total = records.len();
        let applied = records
            .into_iter()
            .filter(|(owner, record)| self.throttler.insert_loaded(*owner, record.clone()))
            .count();
        info!(applied, skipped = total - applied, "throttle store warmed");
        applied
    }

    /// Whether `owner` may prerender now.
    pub async fn is_allowed(&mut self, owner: OwnerIdentity) -> bool {
        self.ensure_loaded(owner).await;
        self.throttler.is_allowed(owner, self.clock.now_ms())
    }

    async fn ensure_loaded(&mut self, owner: OwnerIdentity) {
        if self.throttler.is_loaded(owner) {
            return;
        }
        let store = self.store.clone();
        let record = match tokio::task::spawn_blocking(move || store.load(owner)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                warn!(%owner, error = %e, "failed to read throttle row, using defaults");
                StoredThrottleRecord::default()
            }
            Err(e) => {
                warn!(%owner, error = %e, "throttle read task panicked, using defaults");
                StoredThrottleRecord::default()
            }
        };
        let _ = self.throttler.insert_loaded(owner, record);
    }

    // ── Prerendering ────────────────────────────────────────────────────

    /// Hint that `url` will likely be navigated to soon.
    ///
    /// Stale sessions are a no-op. A rejected request leaves every slot as
    /// it was, except that unsupported headers or a disallowing policy
    /// cancel the prerender they would have replaced.
    #[instrument(skip_all, fields(%connection, %url))]
    pub async fn request_prediction(
        &mut self,
        connection: &ConnectionId,
        url: String,
        referrer: Option<String>,
        extras: PredictionExtras,
    ) -> Result<()> {
        self.affinity.assert_current("ManagerCore::request_prediction");
        let result = self.predict(connection, url, referrer, extras).await;
        let outcome = match &result {
            Ok(label) => *label,
            Err(ManagerError::Rejected(r)) => r.label(),
            Err(_) => "error",
        };
        counter!(PREDICTIONS_TOTAL, "outcome" => outcome).increment(1);
        result.map(|_| ())
    }

    async fn predict(
        &mut self,
        connection: &ConnectionId,
        url: String,
        referrer: Option<String>,
        extras: PredictionExtras,
    ) -> Result<&'static str> {
        let Some(session) = self.sessions.lookup(connection) else {
            debug!("prediction for stale session");
            return Ok("stale");
        };
        let owner = session.owner();
        let referrer = effective_referrer(referrer, session.referrer());
        validate_url(&url)?;

        self.ensure_loaded(owner).await;
        let now = self.clock.now_ms();
        self.throttler.admit_request(owner, self.clock.monotonic_ms())?;

        let unsupported = self.policy.unsupported_headers(&extras);
        if !unsupported.is_empty() {
            if let Some(ended) = self.prerender.cancel(Some(connection)) {
                self.report_prerender_end(ended);
            }
            return Err(Rejected::UnsupportedHeaders(unsupported).into());
        }
        if let Err(reason) = self.policy.check() {
            if let Some(ended) = self.prerender.cancel(None) {
                self.report_prerender_end(ended);
            }
            return Err(Rejected::PolicyDisallowed(reason).into());
        }
        self.throttler.check_allowed(owner, now)?;

        let attempt = self.throttler.record_prerender_attempt(owner, &url, now);
        self.writer.save(owner, attempt.record);
        if let Some(until_ms) = attempt.banned_until_ms {
            counter!(IDENTITY_BANS_TOTAL).increment(1);
            info!(%owner, until_ms, "identity banned from prerendering");
            let _ = self.emitter.emit(ManagerEvent::IdentityBanned { owner, until_ms });
        }

        let start = self.prerender.start_prerender(
            connection,
            &url,
            &referrer,
            extras.normalized_headers(),
            now,
        );
        if let Some(ended) = start.superseded {
            self.report_prerender_end(ended);
        }
        if start.spare_destroyed {
            counter!(SPARE_EVENTS_TOTAL, "event" => "superseded").increment(1);
        }
        let handle = start.started?;
        let _ = self.emitter.emit(ManagerEvent::PrerenderStarted {
            connection: connection.clone(),
            url: url.clone(),
            handle,
        });
        Ok("accepted")
    }

    /// Cancel the prerender owned by `connection`, or any prerender when
    /// `None`. Returns whether one was destroyed.
    pub fn cancel_prediction(&mut self, connection: Option<&ConnectionId>) -> bool {
        self.affinity.assert_current("ManagerCore::cancel_prediction");
        if let Some(c) = connection
            && !self.sessions.contains(c)
        {
            debug!(connection = %c, "cancel for stale session");
            return false;
        }
        match self.prerender.cancel(connection) {
            Some(ended) => {
                self.report_prerender_end(ended);
                true
            }
            None => false,
        }
    }

    /// Perform a real navigation for `connection`.
    ///
    /// Adopts the prerender when it matches, else reuses the spare, else
    /// creates a fresh resource. The resulting surface is bound to the relay.
    #[instrument(skip_all, fields(%connection, %url))]
    pub async fn navigate(
        &mut self,
        connection: &ConnectionId,
        url: String,
        referrer: Option<String>,
        extras: PredictionExtras,
    ) -> Result<NavigationOutcome> {
        self.affinity.assert_current("ManagerCore::navigate");
        let Some(session) = self.sessions.lookup(connection) else {
            return Err(ManagerError::StaleSession(connection.clone()));
        };
        let owner = session.owner();
        let referrer = effective_referrer(referrer, session.referrer());
        validate_url(&url)?;
        self.ensure_loaded(owner).await;
        let now = self.clock.now_ms();

        let outcome = match self.prerender.take_for_navigation(connection, &url, &referrer) {
            TakeOutcome::Adopted { handle, slot } => {
                self.report_prerender_end(slot);
                NavigationOutcome {
                    handle,
                    origin: ResourceOrigin::Prerendered,
                    replace_current_entry: false,
                }
            }
            TakeOutcome::Mispredict { discarded } => {
                if let Some(ended) = discarded {
                    self.report_prerender_end(ended);
                }
                let outcome = self.acquire_resource()?;
                let request = NavigationRequest {
                    url: url.clone(),
                    referrer,
                    headers: extras.normalized_headers(),
                    replace_current_entry: outcome.replace_current_entry,
                    speculative: false,
                };
                self.prerender.navigate(outcome.handle, &request)?;
                outcome
            }
        };

        if let Some(record) = self.throttler.record_success(owner, &url) {
            self.writer.save(owner, record);
        }
        self.relay.bind(outcome.handle, connection.clone(), now);
        if self.settings.prerender.recreate_spare_after_navigation {
            let _ = self.maybe_create_spare();
        }
        info!(handle = %outcome.handle, origin = ?outcome.origin, "navigation started");
        Ok(outcome)
    }

    fn acquire_resource(&mut self) -> Result<NavigationOutcome> {
        if let Some(spare) = self.prerender.take_spare() {
            counter!(SPARE_EVENTS_TOTAL, "event" => "consumed").increment(1);
            let _ = self.emitter.emit(ManagerEvent::SpareConsumed {
                handle: spare.handle,
            });
            return Ok(NavigationOutcome {
                handle: spare.handle,
                origin: ResourceOrigin::Spare,
                replace_current_entry: spare.replace_current_entry,
            });
        }
        Ok(NavigationOutcome {
            handle: self.prerender.create_fresh()?,
            origin: ResourceOrigin::Fresh,
            replace_current_entry: false,
        })
    }

    /// Mark the process warmed and create the spare if allowed. Returns
    /// whether a spare is warm afterwards.
    pub fn warmup(&mut self) -> bool {
        self.affinity.assert_current("ManagerCore::warmup");
        if !self.warmed {
            self.warmed = true;
            info!("warmup requested");
        }
        let _ = self.maybe_create_spare();
        self.prerender.spare().is_some()
    }

    fn maybe_create_spare(&mut self) -> bool {
        if !self.warmed || !self.settings.prerender.spare_enabled || !self.capabilities.spare_renderer {
            return false;
        }
        if let Err(reason) = self.policy.check() {
            debug!(%reason, "spare not created");
            return false;
        }
        match self.prerender.maybe_create_spare() {
            Ok(Some(handle)) => {
                counter!(SPARE_EVENTS_TOTAL, "event" => "created").increment(1);
                let _ = self.emitter.emit(ManagerEvent::SpareCreated { handle });
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to create spare");
                false
            }
        }
    }

    // ── Surfaces ────────────────────────────────────────────────────────

    /// Relay a lifecycle event from a bound surface.
    pub fn surface_event(&mut self, handle: RenderHandle, event: &SurfaceEvent) {
        self.affinity.assert_current("ManagerCore::surface_event");
        let report = self
            .relay
            .observe(handle, event, self.clock.now_ms(), &mut self.sessions);
        if let Some(connection) = report.exhausted {
            warn!(%connection, "callback failed repeatedly, closing session");
            let _ = self.close_session(&connection, CloseReason::CallbackFailures);
        }
    }

    /// A surface handed out by `navigate` was closed by the host.
    pub fn surface_closed(&mut self, handle: RenderHandle) {
        self.affinity.assert_current("ManagerCore::surface_closed");
        let _ = self.relay.unbind(handle);
        let _ = self.prerender.release(handle);
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Current state.
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            sessions: self.sessions.len(),
            prerender: self
                .prerender
                .prerender_slot()
                .map(|slot| (slot.owner.clone(), slot.url.clone())),
            spare: self.prerender.spare(),
            bound_surfaces: self.relay.len(),
            warmed: self.warmed,
        }
    }

    /// Destroy both slots, invalidate every session, and flush pending saves.
    pub async fn shutdown(&mut self) {
        self.affinity.assert_current("ManagerCore::shutdown");
        if let Some(ended) = self.prerender.shutdown() {
            self.report_prerender_end(ended);
        }
        let connections = self.sessions.connection_ids();
        for connection in &connections {
            let _ = self.close_session(connection, CloseReason::Shutdown);
        }
        self.relay.clear();
        self.writer.flush().await;
        info!(sessions = connections.len(), "manager shut down");
    }

    fn report_prerender_end(&self, ended: EndedPrerender) {
        counter!(PRERENDER_OUTCOMES_TOTAL, "outcome" => ended.outcome.as_str()).increment(1);
        let _ = self.emitter.emit(ManagerEvent::PrerenderEnded {
            connection: ended.owner,
            url: ended.url,
            outcome: ended.outcome,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    fn report_sessions(&self) {
        gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
    }
}

/// The call's referrer, else the session's, normalized to `""`.
fn effective_referrer(call: Option<String>, session: Option<&str>) -> String {
    call.filter(|r| !r.is_empty())
        .or_else(|| session.map(str::to_string))
        .unwrap_or_default()
}

/// Accept `http(s)` URLs and scheme-less host hints. Reject anything empty
/// or carrying another scheme.
fn validate_url(raw: &str) -> std::result::Result<(), Rejected> {
    if raw.trim().is_empty() {
        return Err(Rejected::InvalidUrl(raw.to_string()));
    }
    let valid = match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(url::ParseError::RelativeUrlWithoutBase) => is_host_hint(raw),
        Err(_) => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Rejected::InvalidUrl(raw.to_string()))
    }
}

/// `example.com/path`: a dotted host first, no whitespace anywhere.
fn is_host_hint(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let host = raw.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty() && !host.starts_with('.') && host.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockPolicySource;
    use crate::errors::RenderError;
    use crate::prerender::SlotOutcome;
    use crate::testutil::{FactoryLog, RecordingCallback, RecordingFactory};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use tabwarm_core::constants::BAN_DURATION_MS;
    use tabwarm_core::{ManualClock, NavigationEventKind};
    use tabwarm_store::MemoryKvStore;

    const OWNER: OwnerIdentity = OwnerIdentity::new(10_001);

    struct Harness {
        core: ManagerCore,
        log: Arc<Mutex<FactoryLog>>,
        clock: Arc<ManualClock>,
        store: ThrottleStore,
        emitter: Arc<EventEmitter>,
    }

    fn harness_with(
        settings: TabwarmSettings,
        configure: impl FnOnce(ManagerDeps) -> ManagerDeps,
    ) -> Harness {
        let (factory, log) = RecordingFactory::new();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = ThrottleStore::new(Arc::new(MemoryKvStore::new()));
        let emitter = Arc::new(EventEmitter::new());
        let deps = configure(
            ManagerDeps::new(Box::new(factory), store.clone()).with_clock(clock.clone()),
        );
        Harness {
            core: ManagerCore::new(settings, deps, Arc::clone(&emitter)),
            log,
            clock,
            store,
            emitter,
        }
    }

    fn harness() -> Harness {
        harness_with(TabwarmSettings::default(), |d| d)
    }

    async fn predict(core: &mut ManagerCore, c: &ConnectionId, url: &str) -> Result<()> {
        core.request_prediction(c, url.to_string(), None, PredictionExtras::default())
            .await
    }

    async fn navigate(core: &mut ManagerCore, c: &ConnectionId, url: &str) -> Result<NavigationOutcome> {
        core.navigate(c, url.to_string(), None, PredictionExtras::default())
            .await
    }

    #[tokio::test]
    async fn burst_is_throttled_then_admitted() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();

        predict(&mut h.core, &s, "a.com").await.unwrap();
        h.clock.advance(50);
        assert_matches!(
            predict(&mut h.core, &s, "b.com").await,
            Err(ManagerError::Rejected(Rejected::Throttled { retry_after_ms: 50 }))
        );
        assert_eq!(h.core.snapshot().prerender.unwrap().1, "a.com");

        h.clock.advance(200);
        predict(&mut h.core, &s, "b.com").await.unwrap();
        assert_eq!(h.core.snapshot().prerender.unwrap().1, "b.com");
    }

    #[tokio::test]
    async fn newer_prediction_destroys_older_resource() {
        let mut h = harness();
        let s1 = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        let s2 = h
            .core
            .open_session(OwnerIdentity::new(10_002), RecordingCallback::alive())
            .unwrap();
        let mut events = h.emitter.subscribe();

        predict(&mut h.core, &s1, "https://a.example/").await.unwrap();
        predict(&mut h.core, &s2, "https://b.example/").await.unwrap();

        let log = h.log.lock();
        assert_eq!(log.created.len(), 2);
        assert_eq!(log.destroyed, vec![log.created[0]]);
        drop(log);
        assert_eq!(h.core.snapshot().prerender, Some((s2, "https://b.example/".to_string())));

        let mut outcomes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ManagerEvent::PrerenderEnded { outcome, .. } = event {
                outcomes.push(outcome);
            }
        }
        assert_eq!(outcomes, vec![SlotOutcome::Superseded]);
    }

    #[tokio::test]
    async fn closing_owner_empties_slot() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        predict(&mut h.core, &s, "x.com").await.unwrap();

        assert!(h.core.close_session(&s, CloseReason::ClientDisconnect));
        assert!(!h.core.close_session(&s, CloseReason::ClientDisconnect));
        assert!(h.core.snapshot().prerender.is_none());
        assert!(!h.core.session_exists(&s));
        assert!(h.log.lock().live().is_empty());
    }

    #[tokio::test]
    async fn stale_prediction_is_a_no_op() {
        let mut h = harness();
        let gone = ConnectionId::from_raw("conn_gone");
        predict(&mut h.core, &gone, "x.com").await.unwrap();
        assert!(h.core.snapshot().prerender.is_none());
        assert!(!h.core.cancel_prediction(Some(&gone)));
        assert_matches!(
            navigate(&mut h.core, &gone, "x.com").await,
            Err(ManagerError::StaleSession(c)) if c == gone
        );
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        for url in [
            "",
            "   ",
            "javascript:alert(1)",
            "file:///etc/passwd",
            "/etc/passwd",
            "../x",
            "a b",
            "localhost",
            ".hidden.com",
        ] {
            assert_matches!(
                predict(&mut h.core, &s, url).await,
                Err(ManagerError::Rejected(Rejected::InvalidUrl(_)))
            );
        }
        assert!(h.log.lock().created.is_empty());
    }

    #[tokio::test]
    async fn matching_navigation_adopts_and_credits() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        predict(&mut h.core, &s, "x.com").await.unwrap();

        let outcome = navigate(&mut h.core, &s, "x.com").await.unwrap();
        assert_eq!(outcome.origin, ResourceOrigin::Prerendered);
        assert!(!outcome.replace_current_entry);
        assert_eq!(h.core.snapshot().bound_surfaces, 1);

        h.core.shutdown().await;
        let rec = h.store.load(OWNER).unwrap();
        // 10 - 1 for the attempt, + 2 for the matching navigation, capped.
        assert!((rec.score - 10.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn referrer_must_match_for_adoption() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        assert!(h.core.set_referrer(&s, Some("https://ref.example/".into())));
        predict(&mut h.core, &s, "x.com").await.unwrap();
        assert_eq!(h.log.lock().navigations[0].1.referrer, "https://ref.example/");

        let outcome = h
            .core
            .navigate(&s, "x.com".into(), Some("https://other.example/".into()), PredictionExtras::default())
            .await
            .unwrap();
        assert_eq!(outcome.origin, ResourceOrigin::Fresh);
    }

    #[tokio::test]
    async fn mispredict_falls_back_to_spare_then_fresh() {
        let mut settings = TabwarmSettings::default();
        settings.prerender.recreate_spare_after_navigation = false;
        let mut h = harness_with(settings, |d| d);
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        assert!(h.core.warmup());
        let spare = h.core.snapshot().spare.unwrap();

        let first = navigate(&mut h.core, &s, "https://a.example/").await.unwrap();
        assert_eq!(first.origin, ResourceOrigin::Spare);
        assert_eq!(first.handle, spare);
        assert!(first.replace_current_entry);
        {
            let log = h.log.lock();
            let (handle, request) = log.navigations.last().unwrap();
            assert_eq!(*handle, spare);
            assert!(request.replace_current_entry);
            assert!(!request.speculative);
        }

        let second = navigate(&mut h.core, &s, "https://b.example/").await.unwrap();
        assert_eq!(second.origin, ResourceOrigin::Fresh);
        assert!(!second.replace_current_entry);
    }

    #[tokio::test]
    async fn spare_is_recreated_after_navigation() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        assert!(h.core.warmup());
        let first = h.core.snapshot().spare.unwrap();
        let _ = navigate(&mut h.core, &s, "https://a.example/").await.unwrap();
        let next = h.core.snapshot().spare.unwrap();
        assert_ne!(first, next);
    }

    #[tokio::test]
    async fn no_spare_before_warmup_or_without_capability() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        let _ = navigate(&mut h.core, &s, "https://a.example/").await.unwrap();
        assert!(h.core.snapshot().spare.is_none());

        let mut h = harness_with(TabwarmSettings::default(), |d| {
            d.with_capabilities(HostCapabilities {
                spare_renderer: false,
                ..HostCapabilities::default()
            })
        });
        assert!(!h.core.warmup());
        assert!(h.core.snapshot().warmed);
    }

    #[tokio::test]
    async fn unsupported_headers_cancel_and_reject() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        predict(&mut h.core, &s, "x.com").await.unwrap();
        h.clock.advance(1_000);

        let extras = PredictionExtras::default().with_header("Authorization", "Bearer t");
        let err = h
            .core
            .request_prediction(&s, "y.com".into(), None, extras)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ManagerError::Rejected(Rejected::UnsupportedHeaders(names)) if names == vec!["authorization"]
        );
        assert!(h.core.snapshot().prerender.is_none());
    }

    #[tokio::test]
    async fn policy_disallow_cancels_and_rejects() {
        let mut policy = MockPolicySource::new();
        let _ = policy.expect_feature_disabled().return_const(false);
        let _ = policy.expect_network_metered().return_const(true);
        let _ = policy.expect_low_end_device().return_const(false);
        let mut h = harness_with(TabwarmSettings::default(), |d| d.with_policy(Arc::new(policy)));
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();

        assert_matches!(
            predict(&mut h.core, &s, "x.com").await,
            Err(ManagerError::Rejected(Rejected::PolicyDisallowed(
                crate::errors::DisallowReason::NetworkMetered
            )))
        );
        assert!(h.log.lock().created.is_empty());
        // Metered networks get no spare either.
        assert!(!h.core.warmup());
    }

    #[tokio::test]
    async fn repeated_misses_ban_the_identity() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        let mut events = h.emitter.subscribe();

        // Spaced past twice the floor so rate limiting never interferes. The
        // tiny time credit keeps the tenth attempt just above zero.
        for i in 0..11 {
            predict(&mut h.core, &s, &format!("https://miss{i}.example/"))
                .await
                .unwrap();
            h.clock.advance(200);
        }
        assert!(!h.core.is_allowed(OWNER).await);
        assert_matches!(
            predict(&mut h.core, &s, "https://again.example/").await,
            Err(ManagerError::Rejected(Rejected::Banned { .. }))
        );

        let mut banned = None;
        while let Ok(event) = events.try_recv() {
            if let ManagerEvent::IdentityBanned { until_ms, .. } = event {
                banned = Some(until_ms);
            }
        }
        let until = banned.unwrap();
        assert!(until > h.clock.now_ms() + BAN_DURATION_MS - 10_000);

        h.core.shutdown().await;
        assert_eq!(h.store.load(OWNER).unwrap().banned_until_ms, until);
    }

    #[tokio::test]
    async fn persisted_ban_is_loaded_on_demand() {
        let mut h = harness();
        let until = h.clock.now_ms() + 60_000;
        h.store
            .save(
                OWNER,
                &StoredThrottleRecord {
                    score: 10.0,
                    last_prerender_at_ms: Some(h.clock.now_ms()),
                    banned_until_ms: until,
                },
            )
            .unwrap();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        assert_matches!(
            predict(&mut h.core, &s, "x.com").await,
            Err(ManagerError::Rejected(Rejected::Banned { until_ms })) if until_ms == until
        );
        h.clock.advance(60_000);
        assert!(h.core.is_allowed(OWNER).await);
    }

    #[tokio::test]
    async fn warmed_records_do_not_override_live_state() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        predict(&mut h.core, &s, "x.com").await.unwrap();
        let applied = h.core.apply_warmed_records(vec![
            (OWNER, StoredThrottleRecord::default()),
            (OwnerIdentity::new(7), StoredThrottleRecord::default()),
        ]);
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn failing_callback_closes_session() {
        let mut settings = TabwarmSettings::default();
        settings.sessions.max_callback_failures = 2;
        let mut h = harness_with(settings, |d| d);
        let cb = RecordingCallback::alive();
        let s = h.core.open_session(OWNER, cb.clone()).unwrap();
        let outcome = navigate(&mut h.core, &s, "https://a.example/").await.unwrap();

        h.core.surface_event(outcome.handle, &SurfaceEvent::LoadStarted);
        assert_eq!(cb.kinds(), vec![NavigationEventKind::Started]);

        cb.set_failing(true);
        h.core.surface_event(outcome.handle, &SurfaceEvent::Shown);
        assert!(h.core.session_exists(&s));
        h.core.surface_event(outcome.handle, &SurfaceEvent::Hidden);
        assert!(!h.core.session_exists(&s));
        assert_eq!(cb.invalidated(), vec![s]);
        assert_eq!(h.core.snapshot().bound_surfaces, 0);
    }

    #[tokio::test]
    async fn sweep_closes_dead_sessions() {
        let mut h = harness();
        let live = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        let dying = RecordingCallback::alive();
        let dead = h.core.open_session(OWNER, dying.clone()).unwrap();
        predict(&mut h.core, &dead, "x.com").await.unwrap();
        dying.kill();

        assert_eq!(h.core.sweep_dead_sessions(), 1);
        assert!(h.core.session_exists(&live));
        assert!(!h.core.session_exists(&dead));
        assert!(h.core.snapshot().prerender.is_none());
        // Dead callbacks are not notified.
        assert!(dying.invalidated().is_empty());
    }

    #[tokio::test]
    async fn surface_closed_releases_resource() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        let outcome = navigate(&mut h.core, &s, "https://a.example/").await.unwrap();
        h.core.surface_closed(outcome.handle);
        assert_eq!(h.core.snapshot().bound_surfaces, 0);
        assert!(h.log.lock().destroyed.contains(&outcome.handle));
    }

    #[tokio::test]
    async fn shutdown_invalidates_everything() {
        let mut h = harness();
        let cb = RecordingCallback::alive();
        let s = h.core.open_session(OWNER, cb.clone()).unwrap();
        let _ = h.core.warmup();
        predict(&mut h.core, &s, "x.com").await.unwrap();

        h.core.shutdown().await;
        assert_eq!(cb.invalidated(), vec![s]);
        let snapshot = h.core.snapshot();
        assert_eq!(snapshot.sessions, 0);
        assert!(snapshot.prerender.is_none());
        assert!(snapshot.spare.is_none());
        assert!(h.log.lock().live().is_empty());
    }

    #[tokio::test]
    async fn failed_creation_still_charges_the_attempt() {
        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        h.log.lock().fail_create = true;

        assert_matches!(
            predict(&mut h.core, &s, "x.com").await,
            Err(ManagerError::Render(RenderError::Create(_)))
        );
        assert!(h.core.snapshot().prerender.is_none());
        assert!((h.core.throttler.record(OWNER).unwrap().score - 9.0).abs() < 1e-9);

        h.core.shutdown().await;
        let stored = h.store.load(OWNER).unwrap();
        assert!((stored.score - 9.0).abs() < 1e-9);
        assert_eq!(stored.last_prerender_at_ms, Some(h.clock.now_ms()));
    }

    #[tokio::test]
    async fn sweep_evicts_idle_throttle_entries() {
        use tabwarm_core::constants::FORGET_AFTER_MS;

        let mut h = harness();
        let s = h.core.open_session(OWNER, RecordingCallback::alive()).unwrap();
        predict(&mut h.core, &s, "x.com").await.unwrap();
        let _ = h
            .core
            .apply_warmed_records(vec![(OwnerIdentity::new(7), StoredThrottleRecord::default())]);
        assert!(h.core.is_allowed(OwnerIdentity::new(8)).await);
        assert_eq!(h.core.throttler.len(), 3);

        assert_eq!(h.core.sweep_dead_sessions(), 0);
        assert_eq!(h.core.throttler.len(), 1);
        assert!(h.core.throttler.is_loaded(OWNER));

        h.clock.advance(FORGET_AFTER_MS + 1);
        let _ = h.core.sweep_dead_sessions();
        assert!(h.core.throttler.is_empty());
        // The persisted row is untouched and reloads on demand.
        h.core.shutdown().await;
        assert!((h.store.load(OWNER).unwrap().score - 9.0).abs() < 1e-9);
    }

    #[test]
    fn host_hints_need_a_dotted_leading_host() {
        for ok in ["a.com", "www.example.org/path?q=1", "shop.example#top"] {
            assert!(validate_url(ok).is_ok(), "{ok}");
        }
        for bad in ["example", "./a.com", "?q=a.com", "a.com/ b", "\ta.com"] {
            assert!(validate_url(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn referrer_falls_back_to_session() {
        assert_eq!(effective_referrer(Some("a".into()), Some("b")), "a");
        assert_eq!(effective_referrer(Some(String::new()), Some("b")), "b");
        assert_eq!(effective_referrer(None, None), "");
    }
}
