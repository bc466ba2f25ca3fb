//! Per-identity request spacing with exponential backoff.
//!
//! Process-local: the delay returns to the floor on every restart. Times fed
//! to [`RateLimitState::admit`] come from a monotonic reading.

use tabwarm_settings::ThrottleSettings;

/// Floor and ceiling of the enforced spacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Floor.
    pub min_delay_ms: i64,
    /// Ceiling.
    pub max_delay_ms: i64,
}

impl From<&ThrottleSettings> for RateLimitPolicy {
    fn from(s: &ThrottleSettings) -> Self {
        Self {
            min_delay_ms: s.min_delay_ms,
            max_delay_ms: s.max_delay_ms,
        }
    }
}

/// Whether a request got through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Admitted.
    Accepted,
    /// Too soon; nothing changed.
    Rejected {
        /// Time left until the current delay has elapsed.
        retry_after_ms: i64,
    },
}

/// Spacing state for one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitState {
    /// Minimum spacing the next request must respect.
    pub delay_ms: i64,
    /// Last admitted request.
    pub last_request_at_ms: Option<i64>,
}

impl RateLimitState {
    /// Fresh state at the floor.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            delay_ms: policy.min_delay_ms,
            last_request_at_ms: None,
        }
    }

    /// Admit or reject a request arriving at `now_ms`.
    ///
    /// A rejected request leaves the state untouched. An admitted one doubles
    /// the delay when it arrived within twice the delay, and drops it back to
    /// the floor otherwise. An arrival earlier than the last admitted one
    /// counts as a long wait.
    pub fn admit(&mut self, now_ms: i64, policy: RateLimitPolicy) -> Admission {
        let Some(last) = self.last_request_at_ms else {
            self.last_request_at_ms = Some(now_ms);
            return Admission::Accepted;
        };
        let delta = now_ms.saturating_sub(last);
        if delta < 0 {
            self.last_request_at_ms = Some(now_ms);
            self.delay_ms = policy.min_delay_ms;
            return Admission::Accepted;
        }
        if delta < self.delay_ms {
            return Admission::Rejected {
                retry_after_ms: self.delay_ms - delta,
            };
        }
        self.last_request_at_ms = Some(now_ms);
        self.delay_ms = if delta < self.delay_ms.saturating_mul(2) {
            self.delay_ms.saturating_mul(2).min(policy.max_delay_ms)
        } else {
            policy.min_delay_ms
        };
        Admission::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const POLICY: RateLimitPolicy = RateLimitPolicy {
        min_delay_ms: 100,
        max_delay_ms: 10_000,
    };

    #[test]
    fn first_request_is_admitted_at_floor() {
        let mut state = RateLimitState::new(POLICY);
        assert_eq!(state.admit(0, POLICY), Admission::Accepted);
        assert_eq!(state.delay_ms, 100);
        assert_eq!(state.last_request_at_ms, Some(0));
    }

    #[test]
    fn burst_then_relax() {
        // Accepted at 0, rejected at 50, accepted at 250 with reset delay.
        let mut state = RateLimitState::new(POLICY);
        assert_eq!(state.admit(0, POLICY), Admission::Accepted);
        assert_eq!(
            state.admit(50, POLICY),
            Admission::Rejected { retry_after_ms: 50 }
        );
        assert_eq!(state.delay_ms, 100);
        assert_eq!(state.admit(250, POLICY), Admission::Accepted);
        assert_eq!(state.delay_ms, 100);
    }

    #[test]
    fn close_arrivals_double_up_to_ceiling() {
        let mut state = RateLimitState::new(POLICY);
        let mut now = 0;
        assert_eq!(state.admit(now, POLICY), Admission::Accepted);
        let mut expected = 100;
        for _ in 0..10 {
            now += state.delay_ms;
            assert_eq!(state.admit(now, POLICY), Admission::Accepted);
            expected = (expected * 2).min(10_000);
            assert_eq!(state.delay_ms, expected);
        }
        assert_eq!(state.delay_ms, 10_000);
    }

    #[test]
    fn clock_stepping_back_resets_to_floor() {
        const HOUR: i64 = 3_600_000;
        let mut state = RateLimitState::new(POLICY);
        let t0 = 10 * HOUR;
        assert_eq!(state.admit(t0, POLICY), Admission::Accepted);
        assert_eq!(state.admit(t0 + 100, POLICY), Admission::Accepted);
        assert_eq!(state.delay_ms, 200);

        let stepped = t0 - HOUR + 600_000;
        assert_eq!(state.admit(stepped, POLICY), Admission::Accepted);
        assert_eq!(state.delay_ms, POLICY.min_delay_ms);
        assert_eq!(state.last_request_at_ms, Some(stepped));

        // Spacing is enforced again from the new reference point.
        assert_eq!(
            state.admit(stepped + 40, POLICY),
            Admission::Rejected { retry_after_ms: 60 }
        );
    }

    proptest! {
        #[test]
        fn arrivals_inside_delay_are_rejected(gaps in prop::collection::vec(0i64..100, 1..20)) {
            let mut state = RateLimitState::new(POLICY);
            prop_assert_eq!(state.admit(0, POLICY), Admission::Accepted);
            let mut now = 0;
            for gap in gaps {
                now += gap;
                // Cumulative time may cross the delay; only check while inside it.
                if now < state.delay_ms {
                    let before = state;
                    let rejected = matches!(state.admit(now, POLICY), Admission::Rejected { .. });
                    prop_assert!(rejected);
                    prop_assert_eq!(state, before);
                }
            }
        }

        #[test]
        fn delay_grows_within_double_window(fractions in prop::collection::vec(0.0f64..1.0, 1..12)) {
            let mut state = RateLimitState::new(POLICY);
            let mut now = 0;
            let _ = state.admit(now, POLICY);
            for f in fractions {
                let delay = state.delay_ms;
                // Land in [delay, 2 * delay).
                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                let offset = (delay as f64 * f) as i64;
                now += delay + offset.min(delay - 1);
                prop_assert_eq!(state.admit(now, POLICY), Admission::Accepted);
                prop_assert!(state.delay_ms >= delay);
                prop_assert!(state.delay_ms <= POLICY.max_delay_ms);
            }
        }

        #[test]
        fn long_wait_resets_to_floor(warmup in 1usize..8, extra in 0i64..5_000) {
            let mut state = RateLimitState::new(POLICY);
            let mut now = 0;
            let _ = state.admit(now, POLICY);
            for _ in 0..warmup {
                now += state.delay_ms;
                let _ = state.admit(now, POLICY);
            }
            now += 2 * state.delay_ms + extra;
            prop_assert_eq!(state.admit(now, POLICY), Admission::Accepted);
            prop_assert_eq!(state.delay_ms, POLICY.min_delay_ms);
        }
    }
}
