//! Per-surface load progress: `Reset -> WaitingStart -> WaitingFinish -> Reset`.
//!
//! A load start while already waiting for a finish means the previous
//! attempt was abandoned, so the tracker reports `Aborted` before the new
//! `Started`.

use tabwarm_core::{NavigationEventKind, SurfaceEvent};

/// Where the tracked navigation attempt is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadProgress {
    /// No attempt in flight.
    #[default]
    Reset,
    /// A navigation was issued, no load start seen yet.
    WaitingStart,
    /// Loading.
    WaitingFinish,
}

/// Which milestone a timing sample measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    /// Reference timestamp to first load start.
    Start,
    /// Reference timestamp to load finish.
    Finish,
}

/// Elapsed time from the navigation's reference timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTiming {
    /// Milestone.
    pub phase: LoadPhase,
    /// Milliseconds since the reference timestamp.
    pub elapsed_ms: i64,
}

/// What one surface event turns into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// Events for the client, in order.
    pub emitted: Vec<NavigationEventKind>,
    /// Observability sample, if this event completed a milestone.
    pub timing: Option<LoadTiming>,
}

/// Progress machine for one bound surface.
#[derive(Clone, Debug, Default)]
pub struct ProgressTracker {
    state: LoadProgress,
    reference_at_ms: Option<i64>,
}

impl ProgressTracker {
    /// Tracker in `Reset`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> LoadProgress {
        self.state
    }

    /// A navigation was just issued; time milestones from `reference_at_ms`.
    pub fn expect_navigation(&mut self, reference_at_ms: i64) {
        self.state = LoadProgress::WaitingStart;
        self.reference_at_ms = Some(reference_at_ms);
    }

    /// Feed one surface event observed at `now_ms`.
    pub fn on_event(&mut self, event: &SurfaceEvent, now_ms: i64) -> Transition {
        use tabwarm_core::NavigationEventKind as K;
        let mut t = Transition::default();
        match event {
            SurfaceEvent::LoadStarted => {
                match self.state {
                    LoadProgress::WaitingStart => {
                        t.timing = self.sample(LoadPhase::Start, now_ms);
                        t.emitted.push(K::Started);
                    }
                    LoadProgress::WaitingFinish => t.emitted.extend([K::Aborted, K::Started]),
                    LoadProgress::Reset => t.emitted.push(K::Started),
                }
                self.state = LoadProgress::WaitingFinish;
            }
            SurfaceEvent::LoadFinished => {
                if self.state == LoadProgress::WaitingFinish {
                    t.timing = self.sample(LoadPhase::Finish, now_ms);
                }
                t.emitted.push(K::Finished);
                self.reset();
            }
            SurfaceEvent::LoadFailed { .. } => {
                t.emitted.push(K::Failed);
                self.reset();
            }
            SurfaceEvent::Shown => t.emitted.push(K::Shown),
            SurfaceEvent::Hidden => t.emitted.push(K::Hidden),
        }
        t
    }

    fn sample(&self, phase: LoadPhase, now_ms: i64) -> Option<LoadTiming> {
        let reference = self.reference_at_ms?;
        Some(LoadTiming {
            phase,
            elapsed_ms: now_ms.saturating_sub(reference).max(0),
        })
    }

    fn reset(&mut self) {
        self.state = LoadProgress::Reset;
        self.reference_at_ms = None;
    }
}
