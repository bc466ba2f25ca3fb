//! Millisecond clocks.
//!
//! Throttling math works on plain `i64` milliseconds so it stays pure and
//! testable. The service reads time through [`Clock`]; tests drive a
//! [`ManualClock`] instead of sleeping.
//!
//! Two readings are exposed. [`Clock::now_ms`] is wall time and is what gets
//! persisted. [`Clock::monotonic_ms`] never steps backwards and is only
//! meaningful within one process, which is all request spacing needs.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Source of "now" in milliseconds.
pub trait Clock: Send + Sync {
    /// Wall time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Milliseconds since an arbitrary process-local origin. Never decreases.
    fn monotonic_ms(&self) -> i64;
}

static PROCESS_ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Wall clock backed by `chrono::Utc`, monotonic reading backed by [`Instant`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn monotonic_ms(&self) -> i64 {
        i64::try_from(PROCESS_ORIGIN.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Both readings report the same value, so a test that calls [`set`](Self::set)
/// with an earlier time also moves the monotonic reading backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        let _ = self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn monotonic_ms(&self) -> i64 {
        self.now_ms()
    }
}
