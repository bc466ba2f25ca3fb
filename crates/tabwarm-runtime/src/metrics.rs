//! Metric name constants.
//!
//! Recording goes through the `metrics` facade; the embedding host installs
//! whichever recorder it exports with. Without one, every call is a no-op.

/// Open client sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Prediction requests total (counter, labels: outcome).
pub const PREDICTIONS_TOTAL: &str = "predictions_total";
/// Prerender slot endings total (counter, labels: outcome).
pub const PRERENDER_OUTCOMES_TOTAL: &str = "prerender_outcomes_total";
/// Spare resource events total (counter, labels: event).
pub const SPARE_EVENTS_TOTAL: &str = "spare_events_total";
/// Client callback failures total (counter).
pub const CALLBACK_FAILURES_TOTAL: &str = "callback_failures_total";
/// Identities banned total (counter).
pub const IDENTITY_BANS_TOTAL: &str = "identity_bans_total";
/// Navigation reference-to-load-start latency in milliseconds (histogram).
pub const NAVIGATION_LOAD_START_MS: &str = "navigation_load_start_ms";
/// Navigation reference-to-load-finish latency in milliseconds (histogram).
pub const NAVIGATION_LOAD_FINISH_MS: &str = "navigation_load_finish_ms";
