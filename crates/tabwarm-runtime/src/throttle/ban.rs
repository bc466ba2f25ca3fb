//! Ban scoring over persisted [`StoredThrottleRecord`]s.
//!
//! Each prediction attempt costs one point and earns back credit linearly
//! with the time since the previous attempt, so a full score regenerates
//! over one ban duration. Successful navigations earn points back. An
//! identity whose score reaches zero is banned for one ban duration.

use tabwarm_settings::ThrottleSettings;
use tabwarm_store::StoredThrottleRecord;

/// Ban-score tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BanPolicy {
    /// Upper bound and reset value of the score.
    pub max_score: f64,
    /// Length of a ban.
    pub ban_duration_ms: i64,
}

impl From<&ThrottleSettings> for BanPolicy {
    fn from(s: &ThrottleSettings) -> Self {
        Self {
            max_score: s.max_ban_score,
            ban_duration_ms: s.ban_duration_ms,
        }
    }
}

impl BanPolicy {
    /// Score regained per elapsed millisecond.
    #[allow(clippy::cast_precision_loss)]
    pub fn alpha(&self) -> f64 {
        self.max_score / self.ban_duration_ms as f64
    }

    /// Charge one prediction attempt at `now_ms`.
    ///
    /// Returns the ban end when this attempt exhausted the score.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_attempt(&self, record: &mut StoredThrottleRecord, now_ms: i64) -> Option<i64> {
        let elapsed = record
            .last_prerender_at_ms
            .map_or(0, |last| now_ms.saturating_sub(last).max(0));
        record.score = (record.score - 1.0 + self.alpha() * elapsed as f64).min(self.max_score);
        record.last_prerender_at_ms = Some(now_ms);
        self.ban_if_exhausted(record, now_ms)
    }

    /// Credit a successful navigation: two points when it went to the last
    /// predicted URL, one otherwise.
    pub fn record_success(&self, record: &mut StoredThrottleRecord, matched_prediction: bool) {
        let bonus = if matched_prediction { 2.0 } else { 1.0 };
        record.score = (record.score + bonus).min(self.max_score);
    }

    /// Whether the identity may prerender at `now_ms`.
    pub fn is_allowed(record: &StoredThrottleRecord, now_ms: i64) -> bool {
        now_ms >= record.banned_until_ms
    }

    fn ban_if_exhausted(&self, record: &mut StoredThrottleRecord, now_ms: i64) -> Option<i64> {
        if record.score > 0.0 {
            return None;
        }
        record.score = self.max_score;
        record.banned_until_ms = now_ms.saturating_add(self.ban_duration_ms);
        Some(record.banned_until_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabwarm_core::constants::{BAN_DURATION_MS, DAY_MS, MAX_BAN_SCORE};
    use proptest::prelude::*;

    const POLICY: BanPolicy = BanPolicy {
        max_score: MAX_BAN_SCORE,
        ban_duration_ms: BAN_DURATION_MS,
    };

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ten_rapid_misses_trigger_a_ban() {
        let mut rec = StoredThrottleRecord::default();
        let now = 5 * DAY_MS;
        for i in 0..9 {
            assert_eq!(POLICY.record_attempt(&mut rec, now), None, "attempt {i}");
        }
        assert!(approx(rec.score, 1.0));
        let until = POLICY.record_attempt(&mut rec, now);
        assert_eq!(until, Some(now + BAN_DURATION_MS));
        assert!(approx(rec.score, MAX_BAN_SCORE));
        assert!(!BanPolicy::is_allowed(&rec, now));
        assert!(!BanPolicy::is_allowed(&rec, now + BAN_DURATION_MS - 1));
        assert!(BanPolicy::is_allowed(&rec, now + BAN_DURATION_MS));
    }

    #[test]
    fn first_attempt_gets_no_credit() {
        let mut rec = StoredThrottleRecord::default();
        let _ = POLICY.record_attempt(&mut rec, 1_000_000);
        assert!(approx(rec.score, 9.0));
        assert_eq!(rec.last_prerender_at_ms, Some(1_000_000));
    }

    #[test]
    fn elapsed_time_earns_credit() {
        let mut rec = StoredThrottleRecord {
            score: 3.0,
            last_prerender_at_ms: Some(0),
            banned_until_ms: 0,
        };
        // Half a ban duration regenerates half the score.
        let _ = POLICY.record_attempt(&mut rec, BAN_DURATION_MS / 2);
        assert!(approx(rec.score, 3.0 - 1.0 + 5.0));
    }

    #[test]
    fn credit_is_capped() {
        let mut rec = StoredThrottleRecord {
            score: 9.0,
            last_prerender_at_ms: Some(0),
            banned_until_ms: 0,
        };
        let _ = POLICY.record_attempt(&mut rec, 30 * DAY_MS);
        assert!(approx(rec.score, MAX_BAN_SCORE));
    }

    #[test]
    fn negative_elapsed_is_clamped() {
        let mut rec = StoredThrottleRecord {
            score: 5.0,
            last_prerender_at_ms: Some(10 * DAY_MS),
            banned_until_ms: 0,
        };
        let _ = POLICY.record_attempt(&mut rec, DAY_MS);
        assert!(approx(rec.score, 4.0));
    }

    #[test]
    fn success_bonus_depends_on_match() {
        let mut rec = StoredThrottleRecord {
            score: 5.0,
            ..StoredThrottleRecord::default()
        };
        POLICY.record_success(&mut rec, true);
        assert!(approx(rec.score, 7.0));
        POLICY.record_success(&mut rec, false);
        assert!(approx(rec.score, 8.0));
        POLICY.record_success(&mut rec, true);
        assert!(approx(rec.score, MAX_BAN_SCORE));
    }

    proptest! {
        #[test]
        fn success_adds_exact_bonus(score in 0.0f64..10.0, matched in any::<bool>()) {
            let mut rec = StoredThrottleRecord { score, ..StoredThrottleRecord::default() };
            POLICY.record_success(&mut rec, matched);
            let bonus = if matched { 2.0 } else { 1.0 };
            prop_assert!(approx(rec.score, (score + bonus).min(MAX_BAN_SCORE)));
        }

        #[test]
        fn half_correct_predictions_never_ban(
            rounds in prop::collection::vec((any::<bool>(), 0i64..60_000, 0i64..60_000), 1..200)
        ) {
            // Each round is one miss and one hit, in either order.
            let mut rec = StoredThrottleRecord::default();
            let mut now = DAY_MS;
            for (hit_first, gap_a, gap_b) in rounds {
                for (step, gap) in [(hit_first, gap_a), (!hit_first, gap_b)] {
                    now += gap;
                    prop_assert_eq!(POLICY.record_attempt(&mut rec, now), None);
                    if step {
                        POLICY.record_success(&mut rec, true);
                    }
                }
                prop_assert!(rec.score >= 8.0 - 1e-9);
            }
            prop_assert_eq!(rec.banned_until_ms, 0);
        }

        #[test]
        fn score_stays_in_bounds(
            ops in prop::collection::vec((any::<bool>(), 0i64..DAY_MS), 1..100)
        ) {
            let mut rec = StoredThrottleRecord::default();
            let mut now = 0;
            for (success, gap) in ops {
                now += gap;
                if success {
                    POLICY.record_success(&mut rec, true);
                } else {
                    let _ = POLICY.record_attempt(&mut rec, now);
                }
                prop_assert!(rec.score > 0.0 && rec.score <= MAX_BAN_SCORE);
            }
        }
    }
}
