//! Navigation event types.
//!
//! Two event families:
//!
//! - **[`SurfaceEvent`]**: raw lifecycle transitions reported by a browsing
//!   surface (the host's render layer).
//! - **[`NavigationEventKind`]**: what the relay pushes to a client's
//!   registered callback. Includes `Aborted`, which surfaces never report
//!   directly; the relay infers it from a restarted load.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// SurfaceEvent — reported by browsing surfaces
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle transition observed on an active browsing surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// The page began loading.
    LoadStarted,
    /// The page finished loading.
    LoadFinished,
    /// The load failed.
    LoadFailed {
        /// Host-specific error code.
        error_code: i32,
    },
    /// The surface became visible.
    Shown,
    /// The surface was hidden.
    Hidden,
}

impl SurfaceEvent {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LoadStarted => "load_started",
            Self::LoadFinished => "load_finished",
            Self::LoadFailed { .. } => "load_failed",
            Self::Shown => "shown",
            Self::Hidden => "hidden",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NavigationEventKind — pushed to client callbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Navigation event delivered to a session's callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationEventKind {
    /// A navigation started.
    Started,
    /// The navigation finished.
    Finished,
    /// The navigation failed.
    Failed,
    /// The navigation was aborted before finishing (a new load began).
    Aborted,
    /// The tab became visible.
    Shown,
    /// The tab was hidden.
    Hidden,
}

impl NavigationEventKind {
    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
            Self::Shown => "SHOWN",
            Self::Hidden => "HIDDEN",
        }
    }
}

impl fmt::Display for NavigationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
