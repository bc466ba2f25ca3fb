//! Error taxonomy for the manager.
//!
//! - [`Rejected`] — malformed input, disallowed policy, or throttling.
//!   Returned synchronously, no side effects beyond rate-limit bookkeeping.
//! - [`ManagerError::StaleSession`] — the connection no longer exists.
//! - [`CallbackError`] — a client callback failed; caught at the relay
//!   boundary and never propagated.
//! - Persistence corruption never surfaces: the store resets the row.

use std::fmt;

use tabwarm_core::ConnectionId;
use tabwarm_store::StoreError;

/// Why speculative rendering is currently disallowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisallowReason {
    /// Turned off by settings or a host feature flag.
    FeatureDisabled,
    /// The active network is metered.
    NetworkMetered,
    /// The device is classified as low-end.
    LowEndDevice,
}

impl DisallowReason {
    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeatureDisabled => "feature_disabled",
            Self::NetworkMetered => "network_metered",
            Self::LowEndDevice => "low_end_device",
        }
    }
}

impl fmt::Display for DisallowReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request refused before it changed any slot or session state.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Rejected {
    /// The callback supplied at session open is already dead.
    #[error("callback is not alive")]
    InvalidCallback,

    /// Too many open sessions.
    #[error("session capacity reached ({current}/{max})")]
    CapacityExceeded {
        /// Open sessions.
        current: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The URL is empty or uses a scheme that cannot be rendered.
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),

    /// The identity asked again too soon.
    #[error("throttled, retry after {retry_after_ms} ms")]
    Throttled {
        /// Milliseconds until the next request would be admitted.
        retry_after_ms: i64,
    },

    /// The identity is banned from speculative rendering.
    #[error("identity banned until {until_ms}")]
    Banned {
        /// End of the ban (epoch milliseconds).
        until_ms: i64,
    },

    /// Policy signals forbid speculative rendering right now.
    #[error("speculative rendering disallowed: {0}")]
    PolicyDisallowed(DisallowReason),

    /// The prediction carried headers a speculative load cannot honor.
    #[error("unsupported request headers: {0:?}")]
    UnsupportedHeaders(Vec<String>),
}

impl Rejected {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidCallback => "invalid_callback",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Throttled { .. } => "throttled",
            Self::Banned { .. } => "banned",
            Self::PolicyDisallowed(_) => "policy_disallowed",
            Self::UnsupportedHeaders(_) => "unsupported_headers",
        }
    }
}

/// Render factory failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A render resource could not be created.
    #[error("render resource creation failed: {0}")]
    Create(String),

    /// A render resource refused a navigation.
    #[error("navigation failed: {0}")]
    Navigate(String),
}

/// Client callback failures.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The client process is gone.
    #[error("client callback is dead")]
    Dead,

    /// The client raised while handling the notification.
    #[error("client callback failed: {0}")]
    Failed(String),
}

/// Errors returned by manager entry points.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The request was refused.
    #[error(transparent)]
    Rejected(#[from] Rejected),

    /// The connection is unknown or already closed.
    #[error("stale session: {0}")]
    StaleSession(ConnectionId),

    /// The render factory failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The throttle store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The home thread could not be started.
    #[error("home thread unavailable: {0}")]
    HomeThread(String),

    /// The manager has shut down.
    #[error("manager is shut down")]
    Shutdown,
}

/// Convenience alias for manager results.
pub type Result<T> = std::result::Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_converts_into_manager_error() {
        let err: ManagerError = Rejected::Throttled { retry_after_ms: 40 }.into();
        assert_eq!(err.to_string(), "throttled, retry after 40 ms");
    }

    #[test]
    fn labels_are_snake_case() {
        let all = [
            Rejected::InvalidCallback,
            Rejected::CapacityExceeded { current: 1, max: 1 },
            Rejected::InvalidUrl(String::new()),
            Rejected::Throttled { retry_after_ms: 0 },
            Rejected::Banned { until_ms: 0 },
            Rejected::PolicyDisallowed(DisallowReason::NetworkMetered),
            Rejected::UnsupportedHeaders(vec![]),
        ];
        for r in all {
            assert!(r.label().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
