use rand::Rng;
use std::time::Duration;

/// HTTP statuses that are worth another attempt.
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Maximum relative deviation applied to a computed backoff.
pub const JITTER_RATIO: f64 = 0.10;

/// Returns true if a response with this status should be retried.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

#[derive(Copy, Clone, Debug, PartialEq)]
/// Bounded exponential backoff used by the Iterable client for every call.
pub struct RetryPolicy {
    /// Total attempts per call, including the first one.
    pub max_retries: u32,
    /// The backoff interval after the first failed attempt.
    pub initial_backoff: Duration,
    /// Coefficient to multiply the interval with for every past attempt.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_backoff,
            backoff_factor,
        }
    }

    /// Un-jittered backoff to sleep after the failed attempt with 0-based index `attempt`.
    ///
    /// `initial_backoff * backoff_factor^attempt`, saturating at `Duration::MAX`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let pow = self
            .backoff_factor
            .powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_backoff.as_secs_f64() * pow;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Backoff for `attempt` with uniform ±10% jitter.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        self.jittered_backoff_with(attempt, &mut rand::thread_rng())
    }

    pub fn jittered_backoff_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.backoff_for(attempt);
        let factor = rng.gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(base)
    }

    /// True when another attempt is allowed after `attempt` (1-based) failed.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "status {status}");
        }
        for status in [200, 201, 400, 401, 403, 404, 501, 505] {
            assert!(!is_retryable_status(status), "status {status}");
        }
    }

    #[test]
    fn test_default_policy_progression() {
        let policy = RetryPolicy::default();

        let cases = vec![(0, 1000), (1, 2000), (2, 4000), (3, 8000)];
        for (attempt, expected_ms) in cases {
            assert_eq!(
                policy.backoff_for(attempt).as_millis(),
                expected_ms,
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), 3.0);
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in 0..5 {
            let base = policy.backoff_for(attempt).as_secs_f64();
            for _ in 0..100 {
                let jittered = policy.jittered_backoff_with(attempt, &mut rng).as_secs_f64();
                assert!(jittered >= base * 0.9 - 1e-6, "attempt {attempt}: {jittered} < {base}");
                assert!(jittered <= base * 1.1 + 1e-6, "attempt {attempt}: {jittered} > {base}");
            }
        }
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_has_attempts_left() {
        let policy = RetryPolicy::default();
        assert!(policy.has_attempts_left(1));
        assert!(policy.has_attempts_left(2));
        assert!(!policy.has_attempts_left(3));
    }
}
