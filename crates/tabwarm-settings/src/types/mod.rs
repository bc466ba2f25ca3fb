//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Every section is `#[serde(default)]`
//! so a partial settings file only overrides what it names.

mod runtime;
mod throttle;

pub use runtime::*;
pub use throttle::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the tabwarm service.
///
/// Loaded from `~/.tabwarm/settings.json` with defaults applied for missing
/// fields. Example:
///
/// ```json
/// {
///   "throttle": { "maxDelayMs": 5000 },
///   "prerender": { "spareEnabled": false }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabwarmSettings {
    /// Rate-limit and ban-score tuning.
    pub throttle: ThrottleSettings,
    /// Session registry limits.
    pub sessions: SessionSettings,
    /// Speculative rendering switches.
    pub prerender: PrerenderSettings,
    /// Persisted throttle store location.
    pub store: StoreSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TabwarmSettings {
    /// Correct invalid combinations in place.
    ///
    /// Called automatically during loading. Out-of-range values are clamped
    /// with a warning rather than rejected.
    pub fn validate(&mut self) {
        let t = &mut self.throttle;
        if t.min_delay_ms <= 0 {
            tracing::warn!(min_delay_ms = t.min_delay_ms, "minDelayMs must be positive, using 1");
            t.min_delay_ms = 1;
        }
        if t.max_delay_ms < t.min_delay_ms {
            tracing::warn!(
                "throttle maxDelayMs ({}) < minDelayMs ({}), correcting",
                t.max_delay_ms,
                t.min_delay_ms
            );
            t.max_delay_ms = t.min_delay_ms;
        }
        if t.ban_duration_ms <= 0 {
            tracing::warn!(ban_duration_ms = t.ban_duration_ms, "banDurationMs must be positive, using default");
            t.ban_duration_ms = tabwarm_core::constants::BAN_DURATION_MS;
        }
        if !(t.max_ban_score.is_finite() && t.max_ban_score > 0.0) {
            tracing::warn!(max_ban_score = t.max_ban_score, "maxBanScore must be positive, using default");
            t.max_ban_score = tabwarm_core::constants::MAX_BAN_SCORE;
        }

        if self.sessions.max_callback_failures == 0 {
            tracing::warn!("maxCallbackFailures of 0 would close every session, using 1");
            self.sessions.max_callback_failures = 1;
        }
        if self.store.pool_size == 0 {
            tracing::warn!("store poolSize of 0, using 1");
            self.store.pool_size = 1;
        }
        self.prerender.allowed_headers = self
            .prerender
            .allowed_headers
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
