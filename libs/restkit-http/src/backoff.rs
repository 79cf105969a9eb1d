use crate::config::ExponentialBackoff;
use rand::Rng;
use std::time::Duration;

/// Maximum safe backoff in seconds (1 day); anything beyond is unreasonable for retries
const MAX_BACKOFF_SECS: f64 = 86400.0;

/// Upper bound on the random extra delay, as a fraction of the computed delay
const JITTER_FRACTION: f64 = 0.25;

impl ExponentialBackoff {
    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    ///
    /// `initial * multiplier^attempt`, plus jitter in `[0, 25%)` when enabled,
    /// clamped to `max`. A `server_hint` (from `Retry-After` or a rate-limit
    /// reset) larger than that wins, capped at `max_server_delay`.
    ///
    /// Invalid inputs never panic: a NaN, infinite or negative multiplier
    /// falls back to 1.0, and huge attempt numbers saturate at `max`.
    #[must_use]
    pub fn delay(&self, attempt: usize, server_hint: Option<Duration>) -> Duration {
        let computed = self.computed_delay(attempt);
        match server_hint {
            Some(hint) => computed.max(hint.min(self.max_server_delay)),
            None => computed,
        }
    }

    fn computed_delay(&self, attempt: usize) -> Duration {
        let attempt_i32 = i32::try_from(attempt).unwrap_or(i32::MAX);

        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };

        let initial_secs = self.initial.as_secs_f64();
        let max_secs = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);

        let base_secs = initial_secs * multiplier.powi(attempt_i32);
        let clamped = if base_secs.is_finite() {
            base_secs.min(max_secs).max(0.0)
        } else {
            max_secs
        };
        let duration = Duration::from_secs_f64(clamped);

        let duration = if self.jitter {
            let factor = rand::rng().random_range(0.0..JITTER_FRACTION);
            duration + duration.mul_f64(factor)
        } else {
            duration
        };

        // Keep jittered value within max
        duration.min(Duration::from_secs_f64(max_secs))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn no_jitter() -> ExponentialBackoff {
        ExponentialBackoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            max_server_delay: Duration::from_secs(60),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let backoff = no_jitter();
        assert_eq!(backoff.delay(0, None), Duration::from_millis(100));
        assert_eq!(backoff.delay(1, None), Duration::from_millis(200));
        assert_eq!(backoff.delay(2, None), Duration::from_millis(400));
        assert_eq!(backoff.delay(10, None), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_is_monotonic_until_cap() {
        let backoff = no_jitter();
        let mut previous = Duration::ZERO;
        for attempt in 0..20 {
            let delay = backoff.delay(attempt, None);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= backoff.max);
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff {
            jitter: true,
            ..no_jitter()
        };
        for _ in 0..200 {
            let delay = backoff.delay(1, None);
            assert!(delay >= Duration::from_millis(200), "{delay:?}");
            assert!(delay < Duration::from_millis(250), "{delay:?}");
        }
        // Jitter never pushes past max
        for _ in 0..50 {
            assert!(backoff.delay(30, None) <= backoff.max);
        }
    }

    #[test]
    fn test_server_hint_wins_when_larger() {
        let backoff = no_jitter();
        assert_eq!(
            backoff.delay(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        // Smaller hint does not shorten the computed delay
        assert_eq!(
            backoff.delay(2, Some(Duration::from_millis(10))),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_server_hint_is_capped() {
        let backoff = no_jitter();
        assert_eq!(
            backoff.delay(0, Some(Duration::from_secs(3600))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_invalid_multiplier_falls_back_to_one() {
        for multiplier in [f64::NAN, f64::INFINITY, -2.0] {
            let backoff = ExponentialBackoff {
                multiplier,
                ..no_jitter()
            };
            assert_eq!(backoff.delay(0, None), Duration::from_millis(100));
            assert_eq!(backoff.delay(3, None), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let backoff = no_jitter();
        assert_eq!(backoff.delay(usize::MAX, None), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_initial() {
        let backoff = ExponentialBackoff {
            initial: Duration::ZERO,
            ..no_jitter()
        };
        assert_eq!(backoff.delay(5, None), Duration::ZERO);
    }
}
