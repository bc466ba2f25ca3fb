//! The Navigation Event Relay.
//!
//! Binds browsing surfaces to the session that navigated them and forwards
//! their lifecycle events to that session's callback. Delivery is best
//! effort: callback errors are logged and counted, never propagated back
//! into the surface.

use std::collections::HashMap;

use metrics::{counter, histogram};
use tabwarm_core::{ConnectionId, RenderHandle, SurfaceEvent};
use tracing::{debug, warn};

use super::progress::{LoadPhase, ProgressTracker};
use crate::affinity::ThreadAffinity;
use crate::collaborators::deliver;
use crate::metrics::{CALLBACK_FAILURES_TOTAL, NAVIGATION_LOAD_FINISH_MS, NAVIGATION_LOAD_START_MS};
use crate::sessions::SessionRegistry;

#[derive(Debug)]
struct SurfaceBinding {
    connection: ConnectionId,
    progress: ProgressTracker,
}

/// Outcome of relaying one surface event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Notifications the callback accepted.
    pub delivered: usize,
    /// Notifications the callback failed.
    pub failed: usize,
    /// Session that crossed the failure limit and must be closed.
    pub exhausted: Option<ConnectionId>,
}

/// Surface-to-session bindings.
#[derive(Debug)]
pub struct NavigationRelay {
    bindings: HashMap<RenderHandle, SurfaceBinding>,
    max_callback_failures: u32,
    affinity: ThreadAffinity,
}

impl NavigationRelay {
    /// Empty relay.
    pub fn new(max_callback_failures: u32) -> Self {
        Self {
            bindings: HashMap::new(),
            max_callback_failures: max_callback_failures.max(1),
            affinity: ThreadAffinity::current(),
        }
    }

    /// Bind `handle` to `connection` for a navigation issued at `reference_at_ms`.
    ///
    /// Rebinding a surface restarts its progress tracking.
    pub fn bind(&mut self, handle: RenderHandle, connection: ConnectionId, reference_at_ms: i64) {
        self.affinity.assert_current("NavigationRelay::bind");
        let mut progress = ProgressTracker::new();
        progress.expect_navigation(reference_at_ms);
        let _ = self.bindings.insert(
            handle,
            SurfaceBinding {
                connection,
                progress,
            },
        );
    }

    /// Drop the binding for a closed surface.
    pub fn unbind(&mut self, handle: RenderHandle) -> bool {
        self.affinity.assert_current("NavigationRelay::unbind");
        self.bindings.remove(&handle).is_some()
    }

    /// Drop every binding held by `connection`. Returns how many.
    pub fn unbind_session(&mut self, connection: &ConnectionId) -> usize {
        self.affinity.assert_current("NavigationRelay::unbind_session");
        let before = self.bindings.len();
        self.bindings.retain(|_, b| b.connection != *connection);
        before - self.bindings.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Session bound to `handle`.
    pub fn bound_session(&self, handle: RenderHandle) -> Option<&ConnectionId> {
        self.bindings.get(&handle).map(|b| &b.connection)
    }

    /// Number of bound surfaces.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no surface is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Relay `event` from `handle` to its session's callback.
    pub fn observe(
        &mut self,
        handle: RenderHandle,
        event: &SurfaceEvent,
        now_ms: i64,
        sessions: &mut SessionRegistry,
    ) -> RelayReport {
        self.affinity.assert_current("NavigationRelay::observe");
        let mut report = RelayReport::default();
        let Some(binding) = self.bindings.get_mut(&handle) else {
            debug!(%handle, event = event.label(), "event from unbound surface");
            return report;
        };
        let Some(callback) = sessions.lookup(&binding.connection).map(|s| s.callback().clone()) else {
            debug!(%handle, connection = %binding.connection, "surface outlived its session, unbinding");
            let _ = self.bindings.remove(&handle);
            return report;
        };

        let transition = binding.progress.on_event(event, now_ms);
        let connection = binding.connection.clone();

        if let Some(timing) = transition.timing {
            #[allow(clippy::cast_precision_loss)]
            let elapsed = timing.elapsed_ms as f64;
            match timing.phase {
                LoadPhase::Start => histogram!(NAVIGATION_LOAD_START_MS).record(elapsed),
                LoadPhase::Finish => histogram!(NAVIGATION_LOAD_FINISH_MS).record(elapsed),
            }
            debug!(%connection, phase = ?timing.phase, elapsed_ms = timing.elapsed_ms, "navigation timing");
        }

        for kind in transition.emitted {
            match deliver(|| callback.on_navigation_event(&connection, kind)) {
                Ok(()) => {
                    report.delivered += 1;
                    sessions.reset_callback_failures(&connection);
                }
                Err(e) => {
                    report.failed += 1;
                    counter!(CALLBACK_FAILURES_TOTAL).increment(1);
                    let failures = sessions.record_callback_failure(&connection).unwrap_or(0);
                    warn!(%connection, %kind, failures, error = %e, "navigation callback failed");
                    if failures >= self.max_callback_failures {
                        report.exhausted = Some(connection.clone());
                        break;
                    }
                }
            }
        }
        report
    }
}
