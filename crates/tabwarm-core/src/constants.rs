//! Shared constants.

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Floor of the per-identity prediction spacing.
pub const MIN_REQUEST_DELAY_MS: i64 = 100;

/// Ceiling of the per-identity prediction spacing.
pub const MAX_REQUEST_DELAY_MS: i64 = 10_000;

/// How long a ban lasts once the score is exhausted.
pub const BAN_DURATION_MS: i64 = 7 * DAY_MS;

/// Persisted throttle rows idle for longer than this are purged at startup.
pub const FORGET_AFTER_MS: i64 = 14 * DAY_MS;

/// Upper bound (and reset value) of the ban score.
pub const MAX_BAN_SCORE: f64 = 10.0;

/// Placeholder URL every freshly created render resource starts on.
pub const ABOUT_BLANK: &str = "about:blank";
