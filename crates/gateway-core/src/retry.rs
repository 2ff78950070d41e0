use std::time::Duration;

use rand::Rng;

const MIN_BASE: Duration = Duration::from_secs(1);
const MAX_DOUBLINGS: u32 = 10;

/// Exponential backoff schedule for Redis subscribe/bring-up retries.
///
/// The status flavor adds uniform jitter so a fleet of reconnecting clients
/// does not thunder in lockstep; the preflight flavor keeps the bare
/// schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    max_retries: u32,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_retries: u32, jitter: bool) -> Self {
        Self {
            base: base.max(MIN_BASE),
            cap,
            max_retries,
            jitter,
        }
    }

    /// Delay before retry number `attempt` (first failure passes 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base;
        }
        let exponent = (attempt - 1).min(MAX_DOUBLINGS);
        let capped = self.base.saturating_mul(1u32 << exponent).min(self.cap);
        if !self.jitter || capped <= self.base {
            return capped;
        }
        let span = (capped - self.base).as_millis() as u64;
        let offset = rand::thread_rng().gen_range(0..=span);
        self.base + Duration::from_millis(offset)
    }

    /// True once `attempt` has exhausted the configured retry budget.
    /// A budget of 0 means retry forever.
    pub fn should_abort(&self, attempt: u32) -> bool {
        self.max_retries > 0 && attempt >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_secs: u64, cap_secs: u64, max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(base_secs),
            Duration::from_secs(cap_secs),
            max_retries,
            false,
        )
    }

    #[test]
    fn delay_doubles_until_the_cap() {
        let p = policy(1, 30, 0);
        assert_eq!(p.delay(0), Duration::from_secs(1));
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(2), Duration::from_secs(2));
        assert_eq!(p.delay(3), Duration::from_secs(4));
        assert_eq!(p.delay(5), Duration::from_secs(16));
        assert_eq!(p.delay(6), Duration::from_secs(30));
        assert_eq!(p.delay(50), Duration::from_secs(30));
    }

    #[test]
    fn delay_is_monotonic_up_to_the_cap() {
        let p = policy(1, 60, 0);
        for attempt in 0..64 {
            assert!(p.delay(attempt + 1) >= p.delay(attempt));
            assert!(p.delay(attempt) <= Duration::from_secs(60));
        }
    }

    #[test]
    fn base_is_floored_at_one_second() {
        let p = RetryPolicy::new(Duration::ZERO, Duration::from_secs(30), 0, false);
        assert_eq!(p.delay(1), Duration::from_secs(1));
    }

    #[test]
    fn doubling_exponent_saturates() {
        // Attempts far past the doubling window must not overflow.
        let p = policy(1, u64::MAX / 2, 0);
        assert_eq!(p.delay(11), p.delay(200));
    }

    #[test]
    fn jittered_delays_stay_within_the_window() {
        let p = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 0, true);
        for attempt in 1..12 {
            let ceiling = policy(1, 30, 0).delay(attempt);
            for _ in 0..100 {
                let d = p.delay(attempt);
                assert!(d >= Duration::from_secs(1), "below base: {d:?}");
                assert!(d <= ceiling, "above ceiling {ceiling:?}: {d:?}");
            }
        }
    }

    #[test]
    fn jitter_collapses_when_delay_equals_base() {
        let p = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 0, true);
        assert_eq!(p.delay(1), Duration::from_secs(1));
    }

    #[test]
    fn zero_max_retries_never_aborts() {
        let p = policy(1, 30, 0);
        assert!(!p.should_abort(0));
        assert!(!p.should_abort(1_000_000));
    }

    #[test]
    fn abort_triggers_at_the_configured_attempt() {
        let p = policy(1, 30, 3);
        assert!(!p.should_abort(2));
        assert!(p.should_abort(3));
        assert!(p.should_abort(4));
    }
}
