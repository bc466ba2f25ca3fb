//! The Request Throttler: rate limiting plus ban scoring, one entry per
//! owner identity.
//!
//! Pure in-memory bookkeeping. Ban state arrives from the store through
//! [`RequestThrottler::insert_loaded`] and every mutation that must be
//! persisted hands back the updated record for the caller to write out.

use std::collections::HashMap;

use tabwarm_core::OwnerIdentity;
use tabwarm_settings::ThrottleSettings;
use tabwarm_store::StoredThrottleRecord;
use tracing::debug;

use super::ban::BanPolicy;
use super::rate_limit::{Admission, RateLimitPolicy, RateLimitState};
use crate::affinity::ThreadAffinity;
use crate::errors::Rejected;

#[derive(Debug)]
struct ThrottleEntry {
    rate: RateLimitState,
    ban: StoredThrottleRecord,
    last_predicted_url: Option<String>,
}

/// Result of charging a prediction attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptOutcome {
    /// Updated ban state to persist.
    pub record: StoredThrottleRecord,
    /// Set when this attempt started a ban.
    pub banned_until_ms: Option<i64>,
}

/// Per-identity throttling state.
#[derive(Debug)]
pub struct RequestThrottler {
    entries: HashMap<OwnerIdentity, ThrottleEntry>,
    rate_policy: RateLimitPolicy,
    ban_policy: BanPolicy,
    forget_after_ms: i64,
    affinity: ThreadAffinity,
}

impl RequestThrottler {
    /// Empty throttler tuned by `settings`.
    pub fn new(settings: &ThrottleSettings) -> Self {
        Self {
            entries: HashMap::new(),
            rate_policy: RateLimitPolicy::from(settings),
            ban_policy: BanPolicy::from(settings),
            forget_after_ms: settings.forget_after_ms,
            affinity: ThreadAffinity::current(),
        }
    }

    /// Whether `owner`'s persisted record is already in memory.
    pub fn is_loaded(&self, owner: OwnerIdentity) -> bool {
        self.entries.contains_key(&owner)
    }

    /// Seed `owner` with a record read from the store.
    ///
    /// Ignored when the identity is already present: in-memory state is
    /// always at least as new as anything read in the background.
    pub fn insert_loaded(&mut self, owner: OwnerIdentity, record: StoredThrottleRecord) -> bool {
        self.affinity.assert_current("RequestThrottler::insert_loaded");
        if self.entries.contains_key(&owner) {
            return false;
        }
        let _ = self.entries.insert(owner, self.fresh_entry(record));
        true
    }

    /// Rate-limit check for a prediction from `owner` at `now_ms`.
    pub fn admit_request(&mut self, owner: OwnerIdentity, now_ms: i64) -> Result<(), Rejected> {
        self.affinity.assert_current("RequestThrottler::admit_request");
        let policy = self.rate_policy;
        let entry = self.entry(owner);
        match entry.rate.admit(now_ms, policy) {
            Admission::Accepted => Ok(()),
            Admission::Rejected { retry_after_ms } => {
                debug!(%owner, retry_after_ms, delay_ms = entry.rate.delay_ms, "prediction throttled");
                Err(Rejected::Throttled { retry_after_ms })
            }
        }
    }

    /// Ban check for `owner` at `now_ms`.
    pub fn check_allowed(&self, owner: OwnerIdentity, now_ms: i64) -> Result<(), Rejected> {
        match self.entries.get(&owner) {
            Some(entry) if !BanPolicy::is_allowed(&entry.ban, now_ms) => Err(Rejected::Banned {
                until_ms: entry.ban.banned_until_ms,
            }),
            _ => Ok(()),
        }
    }

    /// Whether `owner` may prerender at `now_ms`. Unknown identities may.
    pub fn is_allowed(&self, owner: OwnerIdentity, now_ms: i64) -> bool {
        self.check_allowed(owner, now_ms).is_ok()
    }

    /// Charge a prerender attempt for `url`.
    pub fn record_prerender_attempt(
        &mut self,
        owner: OwnerIdentity,
        url: &str,
        now_ms: i64,
    ) -> AttemptOutcome {
        self.affinity.assert_current("RequestThrottler::record_prerender_attempt");
        let policy = self.ban_policy;
        let entry = self.entry(owner);
        let banned_until_ms = policy.record_attempt(&mut entry.ban, now_ms);
        entry.last_predicted_url = Some(url.to_string());
        AttemptOutcome {
            record: entry.ban.clone(),
            banned_until_ms,
        }
    }

    /// Credit a real navigation to `url` following a prediction.
    ///
    /// Returns the record to persist, or `None` when no prediction was
    /// outstanding for `owner`. The outstanding prediction is consumed.
    pub fn record_success(
        &mut self,
        owner: OwnerIdentity,
        url: &str,
    ) -> Option<StoredThrottleRecord> {
        self.affinity.assert_current("RequestThrottler::record_success");
        let policy = self.ban_policy;
        let entry = self.entries.get_mut(&owner)?;
        let predicted = entry.last_predicted_url.take()?;
        policy.record_success(&mut entry.ban, predicted == url);
        Some(entry.ban.clone())
    }

    /// Drop identities that carry nothing a fresh entry would not.
    ///
    /// An entry goes when its ban record is idle past the forget horizon
    /// at wall time `now_ms`, no ban is in force, and its rate state at
    /// `monotonic_ms` would reset to the floor on the next request anyway.
    /// Returns how many were dropped.
    pub fn evict_idle(&mut self, now_ms: i64, monotonic_ms: i64) -> usize {
        self.affinity.assert_current("RequestThrottler::evict_idle");
        let forget_after_ms = self.forget_after_ms;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let rate_idle = entry.rate.last_request_at_ms.is_none_or(|last| {
                monotonic_ms.saturating_sub(last) >= entry.rate.delay_ms.saturating_mul(2)
            });
            let idle = rate_idle
                && BanPolicy::is_allowed(&entry.ban, now_ms)
                && entry.ban.is_stale(now_ms, forget_after_ms);
            !idle
        });
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, kept = self.entries.len(), "evicted idle throttle entries");
        }
        evicted
    }

    /// In-memory ban record for `owner`.
    pub fn record(&self, owner: OwnerIdentity) -> Option<&StoredThrottleRecord> {
        self.entries.get(&owner).map(|e| &e.ban)
    }

    /// Rate-limit state for `owner`.
    pub fn rate_state(&self, owner: OwnerIdentity) -> Option<RateLimitState> {
        self.entries.get(&owner).map(|e| e.rate)
    }

    /// Identities held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is held in memory.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&mut self, owner: OwnerIdentity) -> &mut ThrottleEntry {
        let fresh = self.fresh_entry(StoredThrottleRecord::default());
        self.entries.entry(owner).or_insert(fresh)
    }

    fn fresh_entry(&self, ban: StoredThrottleRecord) -> ThrottleEntry {
        ThrottleEntry {
            rate: RateLimitState::new(self.rate_policy),
            ban,
            last_predicted_url: None,
        }
    }
}
