//! Request Throttler.
//!
//! Two independent policies share one entry per owner identity:
//! - [`rate_limit`]: process-local spacing with exponential backoff
//! - [`ban`]: persisted score that bans identities whose predictions keep
//!   missing

pub mod ban;
pub mod rate_limit;
pub mod throttler;

pub use ban::BanPolicy;
pub use rate_limit::{Admission, RateLimitPolicy, RateLimitState};
pub use throttler::{AttemptOutcome, RequestThrottler};
