//! Request throttler settings.

use serde::{Deserialize, Serialize};
use tabwarm_core::constants::{
    BAN_DURATION_MS, FORGET_AFTER_MS, MAX_BAN_SCORE, MAX_REQUEST_DELAY_MS, MIN_REQUEST_DELAY_MS,
};

/// Rate-limit and ban-score tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottleSettings {
    /// Floor of the spacing enforced between predictions from one identity.
    pub min_delay_ms: i64,
    /// Ceiling of that spacing.
    pub max_delay_ms: i64,
    /// Ban length once the score is exhausted.
    pub ban_duration_ms: i64,
    /// Persisted rows idle longer than this are purged at startup, and
    /// in-memory entries are evicted by the periodic sweep.
    pub forget_after_ms: i64,
    /// Upper bound and reset value of the ban score.
    pub max_ban_score: f64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: MIN_REQUEST_DELAY_MS,
            max_delay_ms: MAX_REQUEST_DELAY_MS,
            ban_duration_ms: BAN_DURATION_MS,
            forget_after_ms: FORGET_AFTER_MS,
            max_ban_score: MAX_BAN_SCORE,
        }
    }
}
